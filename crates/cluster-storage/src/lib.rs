//! # cluster-storage
//!
//! why: concrete collaborators for the protocol layer: where config files and node
//!      liveness actually live
//! relations: implements cluster_core::VersionStore and cluster_core::NodeDirectory
//! what: InMemoryVersionStore, FileVersionStore, InMemoryDirectory, content checksum

mod checksum;
mod directory;
mod store;

pub use checksum::content_checksum;
pub use directory::InMemoryDirectory;
pub use store::{FileVersionStore, InMemoryVersionStore};
