//! # discovery
//!
//! why: every node needs the same picture of who is alive and who holds office
//! relations: reconciles against collab::NodeDirectory, broadcast through frame.rs
//! what: Discovery snapshot and its three reconciliation operations

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, warn};

use crate::codec::{self, Wire};
use crate::collab::NodeDirectory;
use crate::config::ClusterConfig;
use crate::error::DecodeError;
use crate::node::NodeId;

/// Membership snapshot: alive/dead partition, officeholders, disk counts.
///
/// Invariants kept by every operation here:
/// - no node is both alive and dead
/// - a present master or vice-master is alive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    master: Option<NodeId>,
    vice_master: Option<NodeId>,
    dead: BTreeSet<NodeId>,
    /// alive node -> disk count at snapshot time
    alive: BTreeMap<NodeId, u32>,
}

impl Discovery {
    /// Empty snapshot: nobody known, no officeholders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot fully reconciled against `directory`, ready to broadcast.
    pub fn from_directory(directory: &impl NodeDirectory, config: &ClusterConfig) -> Self {
        let mut snapshot = Self::new();
        snapshot.update_all_nodes_status(directory, config);
        snapshot
    }

    pub fn master(&self) -> Option<NodeId> {
        self.master
    }

    pub fn vice_master(&self) -> Option<NodeId> {
        self.vice_master
    }

    pub fn alive_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.alive.keys().copied()
    }

    pub fn dead_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dead.iter().copied()
    }

    pub fn is_alive(&self, node: NodeId) -> bool {
        self.alive.contains_key(&node)
    }

    pub fn is_dead(&self, node: NodeId) -> bool {
        self.dead.contains(&node)
    }

    /// Disk count for `node`.
    ///
    /// Live for the local node, as of the last sync for everyone else.
    /// `None` when a remote node is not alive in this snapshot.
    pub fn disks_count(&self, node: NodeId, directory: &impl NodeDirectory) -> Option<u32> {
        if node == directory.local_node() {
            return Some(directory.local_disks());
        }
        self.alive.get(&node).copied()
    }

    /// Cheap refresh of the local node's own entry.
    ///
    /// A local id outside the configured range leaves the snapshot untouched.
    pub fn update_local_node_status(
        &mut self,
        directory: &impl NodeDirectory,
        config: &ClusterConfig,
    ) {
        let local = directory.local_node();
        if !config.node_range().contains(local) {
            warn!(%local, "local node outside configured range, not recorded");
            return;
        }
        self.dead.remove(&local);
        self.alive.insert(local, directory.local_disks());

        match directory.master() {
            Some(master) if master == local => self.master = Some(local),
            _ if self.master == Some(local) => self.master = None,
            _ => {}
        }
        match directory.vice_master() {
            Some(vice) if vice == local => self.vice_master = Some(local),
            _ if self.vice_master == Some(local) => self.vice_master = None,
            _ => {}
        }
        debug!(%local, master = ?self.master, vice_master = ?self.vice_master, "local status refreshed");
    }

    /// Rebuild the whole snapshot from the directory.
    ///
    /// Directory entries outside the configured range are skipped, peers
    /// would reject a snapshot naming them.
    pub fn update_all_nodes_status(
        &mut self,
        directory: &impl NodeDirectory,
        config: &ClusterConfig,
    ) {
        let local = directory.local_node();
        let range = config.node_range();
        self.alive.clear();
        self.dead.clear();

        for info in directory.nodes() {
            if !range.contains(info.id) {
                warn!(
                    node = %info.id,
                    first = range.first(),
                    last = range.last(),
                    "directory node outside configured range, skipped"
                );
                continue;
            }
            if info.alive {
                let disks = if info.id == local {
                    directory.local_disks()
                } else {
                    info.disks
                };
                self.alive.insert(info.id, disks);
            } else {
                self.dead.insert(info.id);
            }
        }

        self.master = directory.master();
        self.vice_master = directory.vice_master();
        self.drop_dead_officeholders();
        debug!(
            alive = self.alive.len(),
            dead = self.dead.len(),
            master = ?self.master,
            vice_master = ?self.vice_master,
            "snapshot rebuilt from directory"
        );
    }

    /// Demote every node ranked before `just_connected` to dead.
    ///
    /// When `just_connected` is the local node, every other alive node is
    /// demoted instead. The local node itself is never demoted. Returns the
    /// nodes that moved.
    pub fn update_nodes_info(
        &mut self,
        directory: &impl NodeDirectory,
        just_connected: NodeId,
    ) -> Vec<NodeId> {
        let local = directory.local_node();
        let suspects: Vec<NodeId> = self
            .alive
            .keys()
            .copied()
            .filter(|&node| node != local)
            .filter(|&node| {
                just_connected == local
                    || directory.rank(node, just_connected) == Ordering::Less
            })
            .collect();

        for node in &suspects {
            self.alive.remove(node);
            self.dead.insert(*node);
        }
        self.drop_dead_officeholders();
        debug!(%just_connected, demoted = ?suspects, "suspects demoted");
        suspects
    }

    fn drop_dead_officeholders(&mut self) {
        if self.master.is_some_and(|m| !self.alive.contains_key(&m)) {
            self.master = None;
        }
        if self.vice_master.is_some_and(|v| !self.alive.contains_key(&v)) {
            self.vice_master = None;
        }
    }
}

impl Wire for Discovery {
    fn encode(&self, buf: &mut BytesMut) {
        codec::put_node(buf, self.master);
        codec::put_node(buf, self.vice_master);
        buf.put_i32(self.dead.len() as i32);
        for node in &self.dead {
            buf.put_i32(node.get() as i32);
        }
        buf.put_i32(self.alive.len() as i32);
        for (node, disks) in &self.alive {
            buf.put_i32(node.get() as i32);
            buf.put_u32(*disks);
        }
    }

    fn decode<B: Buf>(buf: &mut B, config: &ClusterConfig) -> Result<Self, DecodeError> {
        let master = codec::get_node(buf, config)?;
        let vice_master = codec::get_node(buf, config)?;

        let dead_count = codec::get_count(buf, "dead nodes", config.max_nodes)?;
        let mut dead = BTreeSet::new();
        for _ in 0..dead_count {
            if !dead.insert(codec::get_present_node(buf, config)?) {
                return Err(DecodeError::Invariant("duplicate dead node"));
            }
        }

        let alive_count = codec::get_count(buf, "alive nodes", config.max_nodes)?;
        let mut alive = BTreeMap::new();
        for _ in 0..alive_count {
            let node = codec::get_present_node(buf, config)?;
            let disks = codec::get_u32(buf)?;
            if alive.insert(node, disks).is_some() {
                return Err(DecodeError::Invariant("duplicate alive node"));
            }
            if dead.contains(&node) {
                return Err(DecodeError::Invariant("node both alive and dead"));
            }
        }

        for holder in [master, vice_master].into_iter().flatten() {
            if !alive.contains_key(&holder) {
                return Err(DecodeError::Invariant("officeholder not alive"));
            }
        }

        Ok(Self {
            master,
            vice_master,
            dead,
            alive,
        })
    }
}
