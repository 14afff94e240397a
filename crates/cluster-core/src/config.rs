//! # config
//!
//! why: one place for the deployment constants every node must agree on
//! relations: read by codec.rs (node range, MTU) and by every frame builder (timeouts)
//! what: ClusterConfig, defaults, validation, json loading

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::node::{NodeRange, MAX_NODES};

/// Longest software version string a Connect may carry, in bytes.
pub const MAX_SOFTWARE_VERSION_LEN: usize = 127;

/// Cluster-wide protocol settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Lowest node id in the cluster
    pub base_node_id: u32,
    /// Number of ids reserved above base (at most MAX_NODES)
    pub max_nodes: usize,
    /// Max payload of one binary frame
    pub max_frame_payload: usize,
    /// Version string advertised in Connect
    pub software_version: String,
    pub connect_timeout_ms: u32,
    pub discovery_timeout_ms: u32,
    pub election_timeout_ms: u32,
    pub notification_timeout_ms: u32,
    pub update_timeout_ms: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            base_node_id: 101,
            max_nodes: MAX_NODES,
            max_frame_payload: 64 * 1024,
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            connect_timeout_ms: 5_000,
            discovery_timeout_ms: 3_000,
            election_timeout_ms: 3_000,
            notification_timeout_ms: 3_000,
            update_timeout_ms: 30_000,
        }
    }
}

impl ClusterConfig {
    /// Parse a config from json and validate it. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_nodes == 0 || self.max_nodes > MAX_NODES {
            return Err(ConfigError::NodeCount {
                got: self.max_nodes,
                max: MAX_NODES,
            });
        }
        if self.base_node_id.checked_add(self.max_nodes as u32 - 1).is_none()
            || self.base_node_id > i32::MAX as u32 - MAX_NODES as u32
        {
            return Err(ConfigError::RangeOverflow {
                base: self.base_node_id,
            });
        }
        if self.max_frame_payload == 0 {
            return Err(ConfigError::ZeroPayload);
        }
        Ok(())
    }

    pub fn node_range(&self) -> NodeRange {
        NodeRange::new(self.base_node_id, self.max_nodes)
    }

    /// Largest file that travels inside an Update frame.
    pub fn inline_limit(&self) -> usize {
        self.max_frame_payload / 2
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.into())
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms.into())
    }

    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms.into())
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms.into())
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::from_millis(self.update_timeout_ms.into())
    }
}
