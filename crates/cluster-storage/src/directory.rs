//! # directory
//!
//! why: the authoritative list of nodes, their liveness, roles and disk counts
//! relations: implements cluster_core::NodeDirectory, read by Discovery reconciliation
//! what: InMemoryDirectory, json load/save

use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use cluster_core::{NodeDirectory, NodeId, NodeInfo, StoreError};
use serde::{Deserialize, Serialize};

/// in-memory node directory
///
/// nodes are ranked by the order they were added (join order); a node
/// added earlier ranks before one added later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryDirectory {
    local: NodeId,
    local_disks: u32,
    nodes: Vec<NodeInfo>,
    master: Option<NodeId>,
    vice_master: Option<NodeId>,
}

impl InMemoryDirectory {
    /// create a directory for `local`, which is registered alive
    pub fn new(local: NodeId, local_disks: u32) -> Self {
        Self {
            local,
            local_disks,
            nodes: vec![NodeInfo {
                id: local,
                alive: true,
                disks: local_disks,
            }],
            master: None,
            vice_master: None,
        }
    }

    /// register a remote node as alive; re-adding keeps its join position
    pub fn add_node(&mut self, id: NodeId, disks: u32) -> &mut Self {
        match self.nodes.iter_mut().find(|info| info.id == id) {
            Some(info) => {
                info.alive = true;
                info.disks = disks;
            }
            None => self.nodes.push(NodeInfo {
                id,
                alive: true,
                disks,
            }),
        }
        self
    }

    pub fn set_alive(&mut self, id: NodeId, alive: bool) -> &mut Self {
        if let Some(info) = self.nodes.iter_mut().find(|info| info.id == id) {
            info.alive = alive;
        }
        self
    }

    pub fn set_master(&mut self, master: Option<NodeId>) -> &mut Self {
        self.master = master;
        self
    }

    pub fn set_vice_master(&mut self, vice_master: Option<NodeId>) -> &mut Self {
        self.vice_master = vice_master;
        self
    }

    /// disks attached to this node right now
    pub fn set_local_disks(&mut self, disks: u32) -> &mut Self {
        self.local_disks = disks;
        self
    }

    /// load a directory from a json file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// save as json (atomic: write to temp file then rename)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn join_position(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|info| info.id == id)
    }
}

impl NodeDirectory for InMemoryDirectory {
    fn local_node(&self) -> NodeId {
        self.local
    }

    fn nodes(&self) -> Vec<NodeInfo> {
        self.nodes.clone()
    }

    fn master(&self) -> Option<NodeId> {
        self.master
    }

    fn vice_master(&self) -> Option<NodeId> {
        self.vice_master
    }

    fn local_disks(&self) -> u32 {
        self.local_disks
    }

    fn rank(&self, a: NodeId, b: NodeId) -> Ordering {
        match (self.join_position(a), self.join_position(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            // unknown nodes rank after every known one
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.cmp(&b),
        }
    }
}
