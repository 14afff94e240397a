//! # codec
//!
//! why: every message shares one fixed-width, big-endian binary form
//! relations: implemented by handshake.rs, discovery.rs, election.rs, eligibility.rs, quorum.rs;
//!            driven by frame.rs
//! what: Wire trait plus checked field readers and writers

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::ClusterConfig;
use crate::error::DecodeError;
use crate::node::NodeId;

/// Sentinel written in place of an absent node id or absent content.
pub const ABSENT: i32 = -1;

/// Binary encode/decode capability shared by all message bodies.
///
/// Decoding needs the cluster config to validate node ids and lengths.
pub trait Wire: Sized {
    fn encode(&self, buf: &mut BytesMut);

    fn decode<B: Buf>(buf: &mut B, config: &ClusterConfig) -> Result<Self, DecodeError>;

    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

pub(crate) fn ensure<B: Buf>(buf: &B, needed: usize) -> Result<(), DecodeError> {
    if buf.remaining() < needed {
        return Err(DecodeError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

pub(crate) fn get_u8<B: Buf>(buf: &mut B) -> Result<u8, DecodeError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_i32<B: Buf>(buf: &mut B) -> Result<i32, DecodeError> {
    ensure(buf, 4)?;
    Ok(buf.get_i32())
}

pub(crate) fn get_u32<B: Buf>(buf: &mut B) -> Result<u32, DecodeError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32())
}

pub(crate) fn get_u64<B: Buf>(buf: &mut B) -> Result<u64, DecodeError> {
    ensure(buf, 8)?;
    Ok(buf.get_u64())
}

pub(crate) fn get_bytes<B: Buf>(buf: &mut B, len: usize) -> Result<Bytes, DecodeError> {
    ensure(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

/// One-byte boolean flag, strictly 0 or 1.
pub(crate) fn get_flag<B: Buf>(buf: &mut B, field: &'static str) -> Result<bool, DecodeError> {
    match get_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        code => Err(DecodeError::InvalidCode {
            field,
            code: code.into(),
        }),
    }
}

/// Four-byte boolean, strictly 0 or 1.
pub(crate) fn get_bool32<B: Buf>(buf: &mut B, field: &'static str) -> Result<bool, DecodeError> {
    match get_i32(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        code => Err(DecodeError::InvalidCode {
            field,
            code: code.into(),
        }),
    }
}

pub(crate) fn put_bool32(buf: &mut BytesMut, value: bool) {
    buf.put_i32(i32::from(value));
}

pub(crate) fn put_node(buf: &mut BytesMut, node: Option<NodeId>) {
    buf.put_i32(node.map_or(ABSENT, |id| id.get() as i32));
}

/// Node id that may be absent (-1).
pub(crate) fn get_node<B: Buf>(
    buf: &mut B,
    config: &ClusterConfig,
) -> Result<Option<NodeId>, DecodeError> {
    match get_i32(buf)? {
        ABSENT => Ok(None),
        raw => check_node(raw, config).map(Some),
    }
}

/// Node id that must be present.
pub(crate) fn get_present_node<B: Buf>(
    buf: &mut B,
    config: &ClusterConfig,
) -> Result<NodeId, DecodeError> {
    let raw = get_i32(buf)?;
    check_node(raw, config)
}

fn check_node(raw: i32, config: &ClusterConfig) -> Result<NodeId, DecodeError> {
    if raw < 0 || !config.node_range().contains(NodeId(raw as u32)) {
        return Err(DecodeError::UnknownNode(raw.into()));
    }
    Ok(NodeId(raw as u32))
}

/// Four-byte element count, bounded by `max`.
pub(crate) fn get_count<B: Buf>(
    buf: &mut B,
    field: &'static str,
    max: usize,
) -> Result<usize, DecodeError> {
    let raw = get_i32(buf)?;
    if raw < 0 || raw as usize > max {
        return Err(DecodeError::MalformedLength {
            field,
            length: raw.into(),
        });
    }
    Ok(raw as usize)
}
