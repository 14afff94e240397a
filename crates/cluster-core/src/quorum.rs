//! # quorum
//!
//! why: the master rolls out a config file by circulating one message that every
//!      visited node acks or nacks in place
//! relations: slots from node.rs, staging through collab::VersionStore, carried as a
//!            mutable accumulator by frame.rs
//! what: AckState, AckRound (the ack vector round), ConfigUpdate (round plus file payload)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::{self, Wire};
use crate::collab::{ClearMode, IncomingFile, VersionStore};
use crate::config::ClusterConfig;
use crate::error::{DecodeError, NodeError};
use crate::node::{NodeId, NodeSlots, MAX_NODES};
use crate::version::FileKind;

/// Observation recorded for one node in a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AckState {
    #[default]
    Unvisited,
    Nacked,
    Acked,
}

impl AckState {
    pub fn code(self) -> i32 {
        match self {
            AckState::Unvisited => -1,
            AckState::Nacked => 0,
            AckState::Acked => 1,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, DecodeError> {
        match code {
            -1 => Ok(AckState::Unvisited),
            0 => Ok(AckState::Nacked),
            1 => Ok(AckState::Acked),
            other => Err(DecodeError::InvalidCode {
                field: "ack state",
                code: other.into(),
            }),
        }
    }
}

/// One round of acknowledgements for a versioned change driven by a master.
///
/// The round is an accumulator: whoever holds the instance records its own
/// slot and passes it on. It is never reused for another version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckRound {
    version: u64,
    master: NodeId,
    acks: NodeSlots<AckState>,
}

impl AckRound {
    /// Start a round for `version`, with the master's own slot already acked.
    pub fn initiate(config: &ClusterConfig, master: NodeId, version: u64) -> Result<Self, NodeError> {
        let mut acks = NodeSlots::filled(config.node_range(), AckState::Unvisited);
        acks.set(master, AckState::Acked)?;
        Ok(Self {
            version,
            master,
            acks,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn master(&self) -> NodeId {
        self.master
    }

    pub fn state(&self, node: NodeId) -> Result<AckState, NodeError> {
        self.acks.get(node).copied()
    }

    pub fn ack(&mut self, node: NodeId) -> Result<(), NodeError> {
        self.acks.set(node, AckState::Acked)?;
        Ok(())
    }

    pub fn nack(&mut self, node: NodeId) -> Result<(), NodeError> {
        self.acks.set(node, AckState::Nacked)?;
        Ok(())
    }

    /// True unless some node nacked. Unvisited nodes do not spoil the round;
    /// requiring a minimum number of acks is up to the caller.
    pub fn is_valid(&self) -> bool {
        self.acks.values().all(|state| *state != AckState::Nacked)
    }

    pub fn ack_count(&self) -> usize {
        self.nodes_in(AckState::Acked).len()
    }

    pub fn acked_nodes(&self) -> Vec<NodeId> {
        self.nodes_in(AckState::Acked)
    }

    pub fn nacked_nodes(&self) -> Vec<NodeId> {
        self.nodes_in(AckState::Nacked)
    }

    pub fn unvisited_nodes(&self) -> Vec<NodeId> {
        self.nodes_in(AckState::Unvisited)
    }

    fn nodes_in(&self, wanted: AckState) -> Vec<NodeId> {
        self.acks
            .iter()
            .filter(|(_, state)| **state == wanted)
            .map(|(node, _)| node)
            .collect()
    }
}

impl Wire for AckRound {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.version);
        buf.put_i32(self.master.get() as i32);
        for state in self.acks.values() {
            buf.put_i32(state.code());
        }
        for _ in self.acks.len()..MAX_NODES {
            buf.put_i32(AckState::Unvisited.code());
        }
    }

    fn decode<B: Buf>(buf: &mut B, config: &ClusterConfig) -> Result<Self, DecodeError> {
        let version = codec::get_u64(buf)?;
        let master = codec::get_present_node(buf, config)?;
        let range = config.node_range();
        let mut acks = NodeSlots::filled(range, AckState::Unvisited);
        for slot in 0..MAX_NODES {
            let state = AckState::from_code(codec::get_i32(buf)?)?;
            match range.node_at(slot) {
                Some(node) => {
                    acks.set(node, state)
                        .map_err(|_| DecodeError::UnknownNode(node.get().into()))?;
                }
                // slots past the configured cluster must stay untouched
                None if state != AckState::Unvisited => {
                    return Err(DecodeError::UnknownNode(
                        i64::from(range.first()) + slot as i64,
                    ));
                }
                None => {}
            }
        }
        Ok(Self {
            version,
            master,
            acks,
        })
    }
}

/// Config-file rollout: an ack round plus the file being offered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    round: AckRound,
    kind: FileKind,
    clear_mode: ClearMode,
    checksum: [u8; 16],
    content: Option<Bytes>,
}

impl ConfigUpdate {
    /// Start a rollout of `file` as `version` of `kind`.
    ///
    /// The content rides along only if it fits in half a frame; otherwise
    /// receivers fetch it themselves using the version and checksum.
    pub fn initiate(
        config: &ClusterConfig,
        master: NodeId,
        kind: FileKind,
        version: u64,
        clear_mode: ClearMode,
        checksum: [u8; 16],
        file: Bytes,
    ) -> Result<Self, NodeError> {
        let round = AckRound::initiate(config, master, version)?;
        let content = (file.len() <= config.inline_limit()).then_some(file);
        debug!(%kind, version, inline = content.is_some(), "config update initiated");
        Ok(Self {
            round,
            kind,
            clear_mode,
            checksum,
            content,
        })
    }

    pub fn round(&self) -> &AckRound {
        &self.round
    }

    pub fn round_mut(&mut self) -> &mut AckRound {
        &mut self.round
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn version(&self) -> u64 {
        self.round.version()
    }

    pub fn clear_mode(&self) -> ClearMode {
        self.clear_mode
    }

    pub fn checksum(&self) -> &[u8; 16] {
        &self.checksum
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn is_inline(&self) -> bool {
        self.content.is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.round.is_valid()
    }

    /// The offered revision as a store sees it.
    pub fn incoming(&self) -> IncomingFile {
        IncomingFile {
            kind: self.kind,
            version: self.round.version(),
            clear_mode: self.clear_mode,
            checksum: self.checksum,
            content: self.content.clone(),
        }
    }

    /// Receiver hop: stage the offered file and record the outcome in our own slot.
    ///
    /// A store failure becomes a nack, never an error. Only an id outside
    /// the cluster range fails.
    pub fn visit(
        &mut self,
        local: NodeId,
        store: &mut impl VersionStore,
    ) -> Result<AckState, NodeError> {
        match store.stage(&self.incoming()) {
            Ok(()) => {
                self.round.ack(local)?;
                debug!(%local, kind = %self.kind, version = self.version(), "update staged");
                Ok(AckState::Acked)
            }
            Err(error) => {
                self.round.nack(local)?;
                warn!(%local, kind = %self.kind, version = self.version(), %error, "update nacked");
                Ok(AckState::Nacked)
            }
        }
    }
}

impl Wire for ConfigUpdate {
    fn encode(&self, buf: &mut BytesMut) {
        self.round.encode(buf);
        buf.put_u8(self.kind.0);
        buf.put_u8(self.clear_mode.code());
        buf.put_slice(&self.checksum);
        match &self.content {
            Some(content) => {
                buf.put_i32(content.len() as i32);
                buf.put_slice(content);
            }
            None => buf.put_i32(codec::ABSENT),
        }
    }

    fn decode<B: Buf>(buf: &mut B, config: &ClusterConfig) -> Result<Self, DecodeError> {
        let round = AckRound::decode(buf, config)?;
        let kind = FileKind(codec::get_u8(buf)?);
        let clear_mode = ClearMode::from_code(codec::get_u8(buf)?)?;
        let mut checksum = [0u8; 16];
        codec::ensure(buf, checksum.len())?;
        buf.copy_to_slice(&mut checksum);
        let content = match codec::get_i32(buf)? {
            codec::ABSENT => None,
            len if len < 0 || len as usize > config.inline_limit() => {
                return Err(DecodeError::MalformedLength {
                    field: "update content",
                    length: len.into(),
                });
            }
            len => Some(codec::get_bytes(buf, len as usize)?),
        };
        Ok(Self {
            round,
            kind,
            clear_mode,
            checksum,
            content,
        })
    }
}
