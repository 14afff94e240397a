//! # election
//!
//! why: carry candidacies and decided outcomes for the two offices between nodes
//! relations: wrapped by frame.rs; vote counting and tie-breaks live outside this crate
//! what: Office, Election

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{self, Wire};
use crate::config::ClusterConfig;
use crate::error::DecodeError;
use crate::node::NodeId;

/// The two elected cluster roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Office {
    Master,
    ViceMaster,
}

impl Office {
    pub fn code(self) -> i32 {
        match self {
            Office::Master => 0,
            Office::ViceMaster => 1,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, DecodeError> {
        match code {
            0 => Ok(Office::Master),
            1 => Ok(Office::ViceMaster),
            other => Err(DecodeError::InvalidCode {
                field: "office",
                code: other.into(),
            }),
        }
    }
}

/// Candidacy (request) or notification of an outcome for one office.
///
/// Only a request may lose its candidate; a notification always names a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Election {
    candidate: Option<NodeId>,
    office: Office,
    is_request: bool,
    canceled: bool,
}

impl Election {
    /// Self-nomination of `candidate` for `office`.
    pub fn candidacy(candidate: NodeId, office: Office) -> Self {
        Self {
            candidate: Some(candidate),
            office,
            is_request: true,
            canceled: false,
        }
    }

    /// Announcement that `node` has been decided for `office`.
    pub fn notification(node: NodeId, office: Office) -> Self {
        Self {
            candidate: Some(node),
            office,
            is_request: false,
            canceled: false,
        }
    }

    pub fn candidate(&self) -> Option<NodeId> {
        self.candidate
    }

    pub fn office(&self) -> Office {
        self.office
    }

    pub fn is_request(&self) -> bool {
        self.is_request
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Retract the self-nomination. Returns `false` on a notification,
    /// which keeps its node.
    pub fn remove_candidate(&mut self) -> bool {
        if !self.is_request {
            debug!(office = ?self.office, "ignoring candidate removal on a notification");
            return false;
        }
        self.candidate = None;
        true
    }

    /// Mark the candidacy withdrawn. Receivers must void any resolution built on it.
    pub fn set_cancel(&mut self, canceled: bool) {
        self.canceled = canceled;
    }
}

impl Wire for Election {
    fn encode(&self, buf: &mut BytesMut) {
        codec::put_bool32(buf, self.is_request);
        codec::put_node(buf, self.candidate);
        buf.put_i32(self.office.code());
        codec::put_bool32(buf, self.canceled);
    }

    fn decode<B: Buf>(buf: &mut B, config: &ClusterConfig) -> Result<Self, DecodeError> {
        let is_request = codec::get_bool32(buf, "is request")?;
        let candidate = if is_request {
            codec::get_node(buf, config)?
        } else {
            Some(codec::get_present_node(buf, config)?)
        };
        let office = Office::from_code(codec::get_i32(buf)?)?;
        let canceled = codec::get_bool32(buf, "canceled")?;
        Ok(Self {
            candidate,
            office,
            is_request,
            canceled,
        })
    }
}
