//! # handshake
//!
//! why: a connecting node must prove software and config compatibility before anything is trusted
//! relations: reads versions through collab::VersionStore, compares VersionVector from version.rs
//! what: Connect, ConnectResponse, ResponseCode

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, warn};

use crate::codec::{self, Wire};
use crate::collab::VersionStore;
use crate::config::{ClusterConfig, MAX_SOFTWARE_VERSION_LEN};
use crate::error::DecodeError;
use crate::version::VersionVector;

/// Compatibility bitmask carried by a ConnectResponse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseCode(u32);

impl ResponseCode {
    pub const OK: ResponseCode = ResponseCode(0);
    pub const SW_MISMATCH: ResponseCode = ResponseCode(1);
    pub const CFG_MISMATCH: ResponseCode = ResponseCode(2);

    const KNOWN_BITS: u32 = Self::SW_MISMATCH.0 | Self::CFG_MISMATCH.0;

    /// `None` if any bit outside SW_MISMATCH | CFG_MISMATCH is set.
    pub fn from_bits(bits: u32) -> Option<Self> {
        (bits & !Self::KNOWN_BITS == 0).then_some(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, flag: ResponseCode) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn insert(&mut self, flag: ResponseCode) {
        self.0 |= flag.0;
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "OK");
        }
        let mut parts = Vec::new();
        if self.contains(Self::SW_MISMATCH) {
            parts.push("SW_MISMATCH");
        }
        if self.contains(Self::CFG_MISMATCH) {
            parts.push("CFG_MISMATCH");
        }
        write!(f, "{}", parts.join("|"))
    }
}

/// Opening message of a connection: who I am software- and config-wise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    software_version: String,
    versions: VersionVector,
}

impl Connect {
    /// Create a Connect, cutting the version string down to 127 bytes.
    ///
    /// Returns `true` alongside the message when the string had to be cut.
    pub fn new(software_version: &str, versions: VersionVector) -> (Self, bool) {
        let kept = truncate_utf8(software_version, MAX_SOFTWARE_VERSION_LEN);
        let truncated = kept.len() < software_version.len();
        if truncated {
            warn!(
                original_len = software_version.len(),
                kept_len = kept.len(),
                "software version truncated for handshake"
            );
        }
        let connect = Self {
            software_version: kept.to_string(),
            versions,
        };
        (connect, truncated)
    }

    /// Capture the local software version and current config versions.
    pub fn build(config: &ClusterConfig, store: &impl VersionStore) -> (Self, bool) {
        Self::new(&config.software_version, store.version_vector())
    }

    pub fn software_version(&self) -> &str {
        &self.software_version
    }

    pub fn versions(&self) -> &VersionVector {
        &self.versions
    }

    /// Judge a peer's Connect against this (local) one.
    pub fn respond_to(&self, peer: &Connect) -> ConnectResponse {
        ConnectResponse::new(self.clone(), peer.clone())
    }
}

impl Wire for Connect {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.software_version.len() as u8);
        buf.put_slice(self.software_version.as_bytes());
        self.versions.encode(buf);
    }

    fn decode<B: Buf>(buf: &mut B, config: &ClusterConfig) -> Result<Self, DecodeError> {
        let len = codec::get_u8(buf)? as usize;
        if len > MAX_SOFTWARE_VERSION_LEN {
            return Err(DecodeError::MalformedLength {
                field: "software version",
                length: len as i64,
            });
        }
        let raw = codec::get_bytes(buf, len)?;
        let software_version =
            String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)?;
        let versions = VersionVector::decode(buf, config)?;
        Ok(Self {
            software_version,
            versions,
        })
    }
}

/// Reply to a Connect: the responder's own Connect, the peer's original,
/// and the verdict computed once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    code: ResponseCode,
    local: Connect,
    peer: Connect,
}

impl ConnectResponse {
    pub fn new(local: Connect, peer: Connect) -> Self {
        let mut code = ResponseCode::OK;
        if local.software_version != peer.software_version {
            code.insert(ResponseCode::SW_MISMATCH);
        }
        let mismatched = local.versions.mismatched_slots(&peer.versions);
        if !mismatched.is_empty() {
            code.insert(ResponseCode::CFG_MISMATCH);
        }
        if local.versions.len() != peer.versions.len() {
            // extra slots on either side are not compared
            debug!(
                local_len = local.versions.len(),
                peer_len = peer.versions.len(),
                "version vectors differ in length"
            );
        }
        debug!(%code, ?mismatched, "handshake evaluated");
        Self { code, local, peer }
    }

    /// Build the local Connect from `store` and judge `peer` against it.
    pub fn build(config: &ClusterConfig, store: &impl VersionStore, peer: Connect) -> Self {
        let (local, _) = Connect::build(config, store);
        Self::new(local, peer)
    }

    pub fn code(&self) -> ResponseCode {
        self.code
    }

    pub fn local(&self) -> &Connect {
        &self.local
    }

    pub fn peer(&self) -> &Connect {
        &self.peer
    }
}

impl Wire for ConnectResponse {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.code.bits());
        self.local.encode(buf);
        self.peer.encode(buf);
    }

    fn decode<B: Buf>(buf: &mut B, config: &ClusterConfig) -> Result<Self, DecodeError> {
        let bits = codec::get_u32(buf)?;
        let code = ResponseCode::from_bits(bits).ok_or(DecodeError::InvalidCode {
            field: "response code",
            code: bits.into(),
        })?;
        let local = Connect::decode(buf, config)?;
        let peer = Connect::decode(buf, config)?;
        Ok(Self { code, local, peer })
    }
}

fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
