//! # collab
//!
//! why: the protocol layer reads node liveness and config versions but owns neither
//! relations: consumed by handshake.rs, discovery.rs and quorum.rs; implemented in cluster-storage
//! what: NodeDirectory, NodeInfo, VersionStore, IncomingFile, ClearMode

use std::cmp::Ordering;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, StoreError};
use crate::node::NodeId;
use crate::version::{ConfigFileVersion, FileKind, FileVersion, VersionVector};

/// What the directory knows about one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub alive: bool,
    pub disks: u32,
}

/// Authoritative view of cluster identity, roles and liveness.
///
/// Implementations are passed in explicitly; nothing here reaches for a
/// process-wide registry.
pub trait NodeDirectory {
    /// Id of the node this process runs as.
    fn local_node(&self) -> NodeId;

    /// Every configured node, alive or not.
    fn nodes(&self) -> Vec<NodeInfo>;

    fn master(&self) -> Option<NodeId>;

    fn vice_master(&self) -> Option<NodeId>;

    /// Disk count of the local node, read at call time.
    fn local_disks(&self) -> u32;

    /// Total order used to decide which nodes are suspect after a reconnect.
    ///
    /// Defaults to ascending node id.
    fn rank(&self, a: NodeId, b: NodeId) -> Ordering {
        a.cmp(&b)
    }
}

/// Whether an update replaces a file or clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClearMode {
    #[default]
    Replace,
    Wipe,
}

impl ClearMode {
    pub fn code(self) -> u8 {
        match self {
            ClearMode::Replace => 0,
            ClearMode::Wipe => 1,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, DecodeError> {
        match code {
            0 => Ok(ClearMode::Replace),
            1 => Ok(ClearMode::Wipe),
            other => Err(DecodeError::InvalidCode {
                field: "clear mode",
                code: other.into(),
            }),
        }
    }
}

/// A file revision offered by the master, as seen by a receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFile {
    pub kind: FileKind,
    pub version: u64,
    pub clear_mode: ClearMode,
    pub checksum: [u8; 16],
    /// Present only when the file was small enough to travel inline.
    pub content: Option<Bytes>,
}

/// Local config-file store with version bookkeeping.
pub trait VersionStore {
    /// Tracked kinds in their fixed deployment order.
    fn tracked_kinds(&self) -> Vec<FileKind>;

    /// Current revision of `kind`, or `None` if the file has never existed.
    fn current_version(&self, kind: FileKind) -> Option<FileVersion>;

    /// Current contents of `kind`.
    fn file_bytes(&self, kind: FileKind) -> Option<Bytes>;

    /// Checksum of the current contents of `kind`.
    fn checksum(&self, kind: FileKind) -> Option<[u8; 16]>;

    /// Fetch (if needed) and validate an offered revision, holding it for commit.
    fn stage(&mut self, incoming: &IncomingFile) -> Result<(), StoreError>;

    /// Promote the staged revision of `kind` to current.
    fn commit(&mut self, kind: FileKind) -> Result<FileVersion, StoreError>;

    /// Current revisions of every tracked kind, in order.
    fn versions(&self) -> Vec<Option<ConfigFileVersion>> {
        self.tracked_kinds()
            .into_iter()
            .map(|kind| {
                self.current_version(kind)
                    .map(|version| ConfigFileVersion { kind, version })
            })
            .collect()
    }

    /// Positional vector advertised during a handshake.
    fn version_vector(&self) -> VersionVector {
        self.versions()
            .into_iter()
            .map(|slot| slot.map(|entry| entry.version))
            .collect()
    }
}
