//! # cluster-core
//!
//! why: membership, election transport and quorum-gated config rollout for a small
//!      fixed-membership storage cluster, as pure message logic
//! relations: collaborators (node directory, version store) are implemented in cluster-storage;
//!            transport and election decisions live outside this workspace
//! what: handshake, discovery snapshot, election and eligibility messages, ack rounds,
//!       config updates, frame envelope and binary codec

pub mod codec;
pub mod collab;
pub mod config;
pub mod discovery;
pub mod election;
pub mod eligibility;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod node;
pub mod quorum;
pub mod version;

pub use codec::Wire;
pub use collab::{ClearMode, IncomingFile, NodeDirectory, NodeInfo, VersionStore};
pub use config::ClusterConfig;
pub use discovery::Discovery;
pub use election::{Election, Office};
pub use eligibility::{Eligibility, EligibilityCause};
pub use error::{ConfigError, DecodeError, NodeError, StoreError};
pub use frame::{Accumulator, Frame, Message, MessageType, Payload};
pub use handshake::{Connect, ConnectResponse, ResponseCode};
pub use node::{NodeId, NodeRange, NodeSlots, MAX_NODES};
pub use quorum::{AckRound, AckState, ConfigUpdate};
pub use version::{ConfigFileVersion, FileKind, FileVersion, VersionVector};
