//! # error
//!
//! why: give every failure of the protocol layer a typed, matchable shape
//! relations: DecodeError from codec.rs and every message decoder, ConfigError from config.rs,
//!            NodeError from node.rs, StoreError from collaborator implementations
//! what: DecodeError, ConfigError, NodeError, StoreError

use thiserror::Error;

use crate::node::NodeId;
use crate::version::FileKind;

/// Raised while turning bytes back into a frame or message.
///
/// A decode error means the frame is dropped. Redelivery or disconnect is up
/// to the transport that handed us the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("buffer truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("unknown frame type tag {0}")]
    UnknownTypeTag(u8),

    #[error("node id {0} is outside the configured cluster range")]
    UnknownNode(i64),

    #[error("malformed {field} length {length}")]
    MalformedLength { field: &'static str, length: i64 },

    #[error("invalid {field} code {code}")]
    InvalidCode { field: &'static str, code: i64 },

    #[error("software version is not valid utf-8")]
    InvalidUtf8,

    #[error("snapshot invariant violated: {0}")]
    Invariant(&'static str),

    #[error("{0} trailing bytes after frame body")]
    TrailingBytes(usize),
}

/// Raised when a cluster configuration cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_nodes must be between 1 and {max}, got {got}")]
    NodeCount { got: usize, max: usize },

    #[error("node id range starting at {base} overflows")]
    RangeOverflow { base: u32 },

    #[error("max_frame_payload must be non-zero")]
    ZeroPayload,

    #[error("failed to parse cluster config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Raised when an id does not belong to the configured node range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("node {id} is outside range [{first}, {last}]")]
    OutOfRange { id: NodeId, first: u32, last: u32 },
}

/// Failures reported by a config-version store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file kind {0} is not tracked")]
    UntrackedKind(FileKind),

    #[error("content for {kind} version {version} is not available")]
    Unavailable { kind: FileKind, version: u64 },

    #[error("checksum mismatch for {kind} version {version}")]
    ChecksumMismatch { kind: FileKind, version: u64 },

    #[error("version {offered} of {kind} is older than current {current}")]
    Stale { kind: FileKind, offered: u64, current: u64 },

    #[error("nothing staged for {0}")]
    NothingStaged(FileKind),

    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
