//! Core data models for streakvault
//!
//! - `BackupType`: the four archive kinds
//! - `Manifest` / `SnapshotMeta`: what an archive holds and how it is listed

pub mod backup_type;
pub mod snapshot;

pub use backup_type::BackupType;
pub use snapshot::{
    parse_snapshot_filename, snapshot_filename, Manifest, SnapshotMeta, MANIFEST_FILE,
};
