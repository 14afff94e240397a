//! # version
//!
//! why: peers compare which revision of each cluster config file they hold
//! relations: VersionVector is carried by handshake.rs, FileKind by quorum.rs and collab.rs
//! what: FileKind, FileVersion (wiped-aware equality), ConfigFileVersion, VersionVector

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{self, Wire};
use crate::config::ClusterConfig;
use crate::error::DecodeError;

/// Identifies one tracked cluster config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileKind(pub u8);

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kind#{}", self.0)
    }
}

/// Revision of a config file.
///
/// Two wiped files are the same revision no matter what counter they carry,
/// so equality is hand-written rather than derived.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FileVersion {
    pub version: u64,
    pub wiped: bool,
}

impl FileVersion {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            wiped: false,
        }
    }

    pub fn wiped(version: u64) -> Self {
        Self {
            version,
            wiped: true,
        }
    }
}

impl PartialEq for FileVersion {
    fn eq(&self, other: &Self) -> bool {
        match (self.wiped, other.wiped) {
            (true, true) => true,
            (false, false) => self.version == other.version,
            _ => false,
        }
    }
}

impl Eq for FileVersion {}

/// A file revision tagged with the kind it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFileVersion {
    pub kind: FileKind,
    pub version: FileVersion,
}

/// One optional revision per tracked file kind.
///
/// Slots are positional: peers agree on kind order by deployment, the order
/// is never sent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionVector(Vec<Option<FileVersion>>);

impl VersionVector {
    pub fn new(slots: Vec<Option<FileVersion>>) -> Self {
        Self(slots)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<FileVersion> {
        self.0.get(index).copied().flatten()
    }

    pub fn slots(&self) -> &[Option<FileVersion>] {
        &self.0
    }

    /// Positions at which the two vectors disagree.
    ///
    /// Only the common prefix is compared. A peer that tracks extra kinds is
    /// not reported for them.
    pub fn mismatched_slots(&self, other: &VersionVector) -> Vec<usize> {
        self.0
            .iter()
            .zip(other.0.iter())
            .enumerate()
            .filter(|(_, (local, peer))| !slot_matches(local, peer))
            .map(|(index, _)| index)
            .collect()
    }
}

fn slot_matches(local: &Option<FileVersion>, peer: &Option<FileVersion>) -> bool {
    match (local, peer) {
        (Some(local), Some(peer)) => local == peer,
        (None, None) => true,
        _ => false,
    }
}

impl FromIterator<Option<FileVersion>> for VersionVector {
    fn from_iter<I: IntoIterator<Item = Option<FileVersion>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Wire for VersionVector {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.0.len() as i32);
        for slot in &self.0 {
            match slot {
                Some(version) => {
                    buf.put_u8(1);
                    buf.put_u64(version.version);
                    buf.put_u8(u8::from(version.wiped));
                }
                None => buf.put_u8(0),
            }
        }
    }

    fn decode<B: Buf>(buf: &mut B, _config: &ClusterConfig) -> Result<Self, DecodeError> {
        let raw = codec::get_i32(buf)?;
        // every slot takes at least its presence byte
        if raw < 0 || raw as usize > buf.remaining() {
            return Err(DecodeError::MalformedLength {
                field: "version vector",
                length: raw.into(),
            });
        }
        let mut slots = Vec::with_capacity(raw as usize);
        for _ in 0..raw {
            if codec::get_flag(buf, "version presence")? {
                let version = codec::get_u64(buf)?;
                let wiped = codec::get_flag(buf, "wiped")?;
                slots.push(Some(FileVersion { version, wiped }));
            } else {
                slots.push(None);
            }
        }
        Ok(Self(slots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiped_versions_are_equal_regardless_of_counter() {
        assert_eq!(FileVersion::wiped(3), FileVersion::wiped(9));
        assert_ne!(FileVersion::wiped(3), FileVersion::new(3));
        assert_ne!(FileVersion::new(3), FileVersion::new(4));
    }

    #[test]
    fn one_sided_absence_is_a_mismatch() {
        let local = VersionVector::new(vec![Some(FileVersion::new(1)), None]);
        let peer = VersionVector::new(vec![None, None]);
        assert_eq!(local.mismatched_slots(&peer), vec![0]);
    }

    #[test]
    fn comparison_stops_at_shorter_vector() {
        let local = VersionVector::new(vec![Some(FileVersion::new(1))]);
        let peer = VersionVector::new(vec![Some(FileVersion::new(1)), Some(FileVersion::new(5))]);
        assert!(local.mismatched_slots(&peer).is_empty());
    }

    #[test]
    fn decode_rejects_length_beyond_buffer() {
        let mut out = BytesMut::new();
        out.put_i32(5);
        out.put_u8(0);
        let mut buf = out.freeze();
        assert!(matches!(
            VersionVector::decode(&mut buf, &ClusterConfig::default()),
            Err(DecodeError::MalformedLength { length: 5, .. })
        ));
    }

    #[test]
    fn decode_keeps_absent_and_wiped_slots() {
        let vector = VersionVector::new(vec![None, Some(FileVersion::wiped(8)), Some(FileVersion::new(2))]);
        let mut buf = vector.to_bytes();
        let decoded = VersionVector::decode(&mut buf, &ClusterConfig::default()).unwrap();
        assert_eq!(decoded.get(0), None);
        assert_eq!(decoded.get(1).map(|v| (v.version, v.wiped)), Some((8, true)));
        assert_eq!(decoded.get(2).map(|v| (v.version, v.wiped)), Some((2, false)));
    }
}
