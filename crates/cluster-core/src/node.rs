//! # node
//!
//! why: node ids are dense in a fixed range and double as slot indexes everywhere
//! relations: NodeRange is derived from config.rs, NodeSlots backs the ack vector in quorum.rs
//! what: NodeId, NodeRange, NodeSlots, MAX_NODES

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Hard ceiling on cluster size. The wire ack vector always carries this many slots.
pub const MAX_NODES: usize = 16;

/// Identity of a cluster node, stable for the node's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The contiguous id range `[first, first + capacity - 1]` a cluster may use.
///
/// All id -> slot arithmetic goes through here so that nothing else has to
/// know about the base offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRange {
    first: u32,
    capacity: usize,
}

impl NodeRange {
    /// Build a range. Capacity is clamped to `1..=MAX_NODES` and to the ids
    /// left above `first`; use `ClusterConfig::validate` to reject bad values
    /// instead of clamping.
    pub fn new(first: u32, capacity: usize) -> Self {
        let room = ((u32::MAX - first) as usize).saturating_add(1);
        Self {
            first,
            capacity: capacity.clamp(1, MAX_NODES).min(room),
        }
    }

    pub fn first(&self) -> u32 {
        self.first
    }

    pub fn last(&self) -> u32 {
        self.first.saturating_add(self.capacity as u32 - 1)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 >= self.first && id.0 <= self.last()
    }

    /// Slot index of `id`, or an error if the id is outside the range.
    pub fn slot(&self, id: NodeId) -> Result<usize, NodeError> {
        if self.contains(id) {
            Ok((id.0 - self.first) as usize)
        } else {
            Err(NodeError::OutOfRange {
                id,
                first: self.first,
                last: self.last(),
            })
        }
    }

    /// Node occupying `slot`, if the slot is within capacity.
    pub fn node_at(&self, slot: usize) -> Option<NodeId> {
        (slot < self.capacity).then(|| NodeId(self.first + slot as u32))
    }

    /// Every id in the range, ascending.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> {
        let first = self.first;
        (0..self.capacity as u32).map(move |offset| NodeId(first + offset))
    }
}

/// Fixed-capacity map from every node in a range to a value.
///
/// Each id in the range always has exactly one slot, so lookups by a valid id
/// never miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSlots<T> {
    range: NodeRange,
    slots: Vec<T>,
}

impl<T: Clone> NodeSlots<T> {
    /// Create a map with every slot set to `value`.
    pub fn filled(range: NodeRange, value: T) -> Self {
        Self {
            range,
            slots: vec![value; range.capacity()],
        }
    }
}

impl<T> NodeSlots<T> {
    pub fn range(&self) -> NodeRange {
        self.range
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Result<&T, NodeError> {
        let slot = self.range.slot(id)?;
        Ok(&self.slots[slot])
    }

    /// Replace the value for `id`, returning the previous one.
    pub fn set(&mut self, id: NodeId, value: T) -> Result<T, NodeError> {
        let slot = self.range.slot(id)?;
        Ok(std::mem::replace(&mut self.slots[slot], value))
    }

    /// `(id, value)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.range.iter().zip(self.slots.iter())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }
}
