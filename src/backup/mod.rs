//! Backup system for streakvault
//!
//! Creates self-contained snapshots of the live store, rotates them under a
//! per-type retention policy and restores from them safely.
//!
//! # Architecture
//!
//! - `SnapshotBuilder`: stages one snapshot and publishes it atomically
//! - `ArchiveStore`: lists, resolves and prunes published archives
//! - `BackupManager`: build followed by retention, as one unit
//! - `RestoreManager`: confirmed swap with a mandatory emergency snapshot
//!
//! # Archive Format
//!
//! Each snapshot is one zip file under `backups/<type>/` holding:
//! - `manifest.json`: provenance, row counts, bundled file list
//! - `database/recovery.db`: raw copy of the store
//! - `database/dump.sql`: statement-level dump
//! - `database/tables.json`: per-table rows as JSON
//! - `config/`, `data/`: small configuration and static data files
//! - `logs/`: log files modified within the last 30 days
//!
//! # Example
//!
//! ```rust,ignore
//! use streakvault::backup::{BackupManager, RestoreManager};
//! use streakvault::config::{Settings, VaultPaths};
//! use streakvault::models::BackupType;
//!
//! let paths = VaultPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//!
//! let manager = BackupManager::new(paths.clone(), &settings);
//! let outcome = manager.create_backup(BackupType::Manual)?;
//!
//! // Later, restore from it
//! let restore = RestoreManager::new(paths, &settings);
//! let op = restore.restore(&outcome.snapshot.filename, true)?;
//! println!("{}", op.summary());
//! ```

pub mod archive;
pub mod builder;
pub mod export;
mod manager;
mod restore;

pub use archive::{extract_archive, read_manifest, ArchiveStatus, ArchiveStore, RetentionReport};
pub use builder::SnapshotBuilder;
pub use manager::{BackupManager, BackupOutcome};
pub use restore::{ExtractedSnapshot, RestoreManager, RestoreOperation};

pub(crate) use restore::install_store;
