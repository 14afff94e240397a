//! # store
//!
//! why: hold the tracked cluster config files, their versions, and revisions staged by a rollout
//! relations: implements cluster_core::VersionStore; checksums from checksum.rs
//! what: InMemoryVersionStore (tests, simulated fetch source), FileVersionStore (on disk)

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use cluster_core::{
    ClearMode, ConfigFileVersion, FileKind, FileVersion, IncomingFile, StoreError, VersionStore,
};
use tracing::{debug, warn};

use crate::checksum::content_checksum;

/// a file revision with its content (empty when wiped)
#[derive(Debug, Clone)]
struct StoredFile {
    version: FileVersion,
    content: Bytes,
}

/// checks shared by every store before an offered revision may be staged
///
/// `fetch` is only called when the content did not travel inline.
fn prepare(
    incoming: &IncomingFile,
    tracked: bool,
    current: Option<FileVersion>,
    fetch: impl FnOnce() -> Option<Bytes>,
) -> Result<StoredFile, StoreError> {
    let kind = incoming.kind;
    if !tracked {
        return Err(StoreError::UntrackedKind(kind));
    }
    if let Some(current) = current {
        if !current.wiped && incoming.version < current.version {
            return Err(StoreError::Stale {
                kind,
                offered: incoming.version,
                current: current.version,
            });
        }
    }

    if incoming.clear_mode == ClearMode::Wipe {
        return Ok(StoredFile {
            version: FileVersion::wiped(incoming.version),
            content: Bytes::new(),
        });
    }

    let content = match &incoming.content {
        Some(content) => content.clone(),
        None => fetch().ok_or(StoreError::Unavailable {
            kind,
            version: incoming.version,
        })?,
    };
    if content_checksum(&content) != incoming.checksum {
        return Err(StoreError::ChecksumMismatch {
            kind,
            version: incoming.version,
        });
    }
    Ok(StoredFile {
        version: FileVersion::new(incoming.version),
        content,
    })
}

// -- in-memory store --

/// in-memory store for testing
///
/// `publish_remote` stands in for the out-of-band fetch mechanism: a
/// revision published there can be staged without inline content.
#[derive(Debug, Default)]
pub struct InMemoryVersionStore {
    kinds: Vec<FileKind>,
    files: HashMap<FileKind, StoredFile>,
    staged: HashMap<FileKind, StoredFile>,
    remote: HashMap<(FileKind, u64), Bytes>,
}

impl InMemoryVersionStore {
    /// create a store tracking `kinds` in the given order, all files absent
    pub fn new(kinds: Vec<FileKind>) -> Self {
        Self {
            kinds,
            ..Self::default()
        }
    }

    /// seed a current revision
    pub fn with_file(mut self, kind: FileKind, version: u64, content: impl Into<Bytes>) -> Self {
        self.files.insert(
            kind,
            StoredFile {
                version: FileVersion::new(version),
                content: content.into(),
            },
        );
        self
    }

    /// seed a wiped revision
    pub fn with_wiped(mut self, kind: FileKind, version: u64) -> Self {
        self.files.insert(
            kind,
            StoredFile {
                version: FileVersion::wiped(version),
                content: Bytes::new(),
            },
        );
        self
    }

    /// make a revision fetchable out-of-band
    pub fn publish_remote(&mut self, kind: FileKind, version: u64, content: impl Into<Bytes>) {
        self.remote.insert((kind, version), content.into());
    }

    /// revision currently staged for `kind`
    pub fn staged_version(&self, kind: FileKind) -> Option<FileVersion> {
        self.staged.get(&kind).map(|file| file.version)
    }
}

impl VersionStore for InMemoryVersionStore {
    fn tracked_kinds(&self) -> Vec<FileKind> {
        self.kinds.clone()
    }

    fn current_version(&self, kind: FileKind) -> Option<FileVersion> {
        self.files.get(&kind).map(|file| file.version)
    }

    fn file_bytes(&self, kind: FileKind) -> Option<Bytes> {
        self.files.get(&kind).map(|file| file.content.clone())
    }

    fn checksum(&self, kind: FileKind) -> Option<[u8; 16]> {
        self.files.get(&kind).map(|file| content_checksum(&file.content))
    }

    fn stage(&mut self, incoming: &IncomingFile) -> Result<(), StoreError> {
        let tracked = self.kinds.contains(&incoming.kind);
        let current = self.current_version(incoming.kind);
        let remote = &self.remote;
        let file = prepare(incoming, tracked, current, || {
            remote.get(&(incoming.kind, incoming.version)).cloned()
        })?;
        self.staged.insert(incoming.kind, file);
        Ok(())
    }

    fn commit(&mut self, kind: FileKind) -> Result<FileVersion, StoreError> {
        let file = self
            .staged
            .remove(&kind)
            .ok_or(StoreError::NothingStaged(kind))?;
        let version = file.version;
        self.files.insert(kind, file);
        Ok(version)
    }
}

// -- file store --

/// version table persisted next to the files
#[derive(serde::Serialize, serde::Deserialize, Default)]
struct VersionTable {
    kinds: Vec<FileKind>,
    versions: Vec<ConfigFileVersion>,
}

/// file-based store
///
/// layout under the root directory:
/// - versions.json: tracked kinds and current revisions
/// - kind-<n>.cfg: current content of each kind
/// - staged/kind-<n>.cfg: revision staged by a rollout, awaiting commit
/// - incoming/kind-<n>-<version>.cfg: revisions delivered by the out-of-band fetch
pub struct FileVersionStore {
    dir: PathBuf,
    table: VersionTable,
    /// staged revisions, not persisted: a restart abandons the round
    staged: HashMap<FileKind, FileVersion>,
}

impl FileVersionStore {
    /// open the store at `dir`, creating it (tracking `kinds`) if it is new
    pub fn open(dir: impl Into<PathBuf>, kinds: Vec<FileKind>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(dir.join("staged"))?;
        fs::create_dir_all(dir.join("incoming"))?;

        let table_path = dir.join("versions.json");
        let table = if table_path.exists() {
            let contents = fs::read_to_string(&table_path)?;
            serde_json::from_str(&contents)?
        } else {
            VersionTable {
                kinds,
                versions: Vec::new(),
            }
        };

        let mut store = Self {
            dir,
            table,
            staged: HashMap::new(),
        };
        store.save_table()?;
        Ok(store)
    }

    /// path where the out-of-band fetch drops `version` of `kind`
    pub fn incoming_path(&self, kind: FileKind, version: u64) -> PathBuf {
        self.dir
            .join("incoming")
            .join(format!("kind-{}-{}.cfg", kind.0, version))
    }

    /// write a new local revision directly, bypassing staging (master side)
    pub fn write_file(&mut self, kind: FileKind, version: u64, content: &[u8]) -> Result<(), StoreError> {
        if !self.table.kinds.contains(&kind) {
            return Err(StoreError::UntrackedKind(kind));
        }
        write_atomic(&self.file_path(kind), content)?;
        self.set_version(kind, FileVersion::new(version));
        self.save_table()
    }

    fn file_path(&self, kind: FileKind) -> PathBuf {
        self.dir.join(format!("kind-{}.cfg", kind.0))
    }

    fn staged_path(&self, kind: FileKind) -> PathBuf {
        self.dir.join("staged").join(format!("kind-{}.cfg", kind.0))
    }

    fn set_version(&mut self, kind: FileKind, version: FileVersion) {
        self.table.versions.retain(|entry| entry.kind != kind);
        self.table.versions.push(ConfigFileVersion { kind, version });
    }

    fn save_table(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.table)?;
        write_atomic(&self.dir.join("versions.json"), json.as_bytes())?;
        Ok(())
    }
}

/// atomic write: write to temp file then rename
fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)
}

/// remove `path`; a file that is already gone is fine
fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}

impl VersionStore for FileVersionStore {
    fn tracked_kinds(&self) -> Vec<FileKind> {
        self.table.kinds.clone()
    }

    fn current_version(&self, kind: FileKind) -> Option<FileVersion> {
        self.table
            .versions
            .iter()
            .find(|entry| entry.kind == kind)
            .map(|entry| entry.version)
    }

    fn file_bytes(&self, kind: FileKind) -> Option<Bytes> {
        let version = self.current_version(kind)?;
        if version.wiped {
            return Some(Bytes::new());
        }
        match fs::read(self.file_path(kind)) {
            Ok(content) => Some(Bytes::from(content)),
            Err(error) => {
                warn!(%kind, %error, "config file unreadable");
                None
            }
        }
    }

    fn checksum(&self, kind: FileKind) -> Option<[u8; 16]> {
        self.file_bytes(kind).map(|content| content_checksum(&content))
    }

    fn stage(&mut self, incoming: &IncomingFile) -> Result<(), StoreError> {
        let tracked = self.table.kinds.contains(&incoming.kind);
        let current = self.current_version(incoming.kind);
        let incoming_path = self.incoming_path(incoming.kind, incoming.version);
        let file = prepare(incoming, tracked, current, || {
            fs::read(&incoming_path).ok().map(Bytes::from)
        })?;

        write_atomic(&self.staged_path(incoming.kind), &file.content)?;
        self.staged.insert(incoming.kind, file.version);
        debug!(kind = %incoming.kind, version = incoming.version, "revision staged on disk");
        Ok(())
    }

    fn commit(&mut self, kind: FileKind) -> Result<FileVersion, StoreError> {
        let version = self
            .staged
            .remove(&kind)
            .ok_or(StoreError::NothingStaged(kind))?;
        let staged_path = self.staged_path(kind);
        if version.wiped {
            remove_if_present(&self.file_path(kind))?;
            remove_if_present(&staged_path)?;
        } else {
            fs::rename(&staged_path, self.file_path(kind))?;
        }
        self.set_version(kind, version);
        self.save_table()?;
        Ok(version)
    }
}
