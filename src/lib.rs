//! streakvault - backup and recovery for a single SQLite application store
//!
//! This library snapshots a live store (plus its configuration, data files
//! and recent logs) into self-describing zip archives, rotates them under a
//! per-type retention policy, restores from them safely, and diagnoses and
//! repairs a damaged store.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `models`: Backup types, manifests and snapshot metadata
//! - `storage`: Atomic file helpers and SQLite introspection
//! - `integrity`: Store self-test
//! - `backup`: Snapshot building, archive store, retention and restore
//! - `recovery`: Diagnosis, tiered repair, rebuild and recovery reports
//! - `scheduler`: Timer and worker threads for scheduled backups
//! - `service`: The single entry point that serializes all operations
//!
//! # Example
//!
//! ```rust,ignore
//! use streakvault::{BackupService, BackupType};
//!
//! let service = BackupService::open()?;
//! let outcome = service.create_backup(BackupType::Manual)?;
//! println!("{}", outcome.snapshot.path.display());
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod integrity;
pub mod models;
pub mod notify;
pub mod recovery;
pub mod scheduler;
pub mod service;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use error::{VaultError, VaultResult};
pub use models::{BackupType, Manifest, SnapshotMeta};
pub use notify::{BackupEvent, LogNotifier, Notifier};
pub use scheduler::{Scheduler, SchedulerState, SchedulerStats};
pub use service::{BackupService, BackupStatus};
