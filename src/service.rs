//! The backup service
//!
//! One explicit object, built once at startup and shared by reference with
//! the scheduler and any calling layer. Every operation that writes archives
//! or the live store holds the same lock, so no two of them ever interleave.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::backup::{
    ArchiveStatus, ArchiveStore, BackupManager, BackupOutcome, RestoreManager, RestoreOperation,
};
use crate::config::paths::VaultPaths;
use crate::config::settings::Settings;
use crate::error::{VaultError, VaultResult};
use crate::integrity::check_integrity;
use crate::models::{BackupType, SnapshotMeta};
use crate::recovery::{DiagnosisReport, RebuildOutcome, RecoveryTool, RepairOutcome};

/// Health summary for the calling layer
#[derive(Debug, Clone)]
pub struct BackupStatus {
    pub checked_at: DateTime<Utc>,
    pub store_path: PathBuf,
    pub store_exists: bool,
    pub store_size_bytes: u64,
    pub store_healthy: bool,
    pub archives: ArchiveStatus,
}

/// Entry point for every backup and recovery operation
pub struct BackupService {
    paths: VaultPaths,
    settings: Settings,
    backups: BackupManager,
    restores: RestoreManager,
    recovery: RecoveryTool,
    op_lock: Mutex<()>,
}

impl BackupService {
    /// Create a new BackupService
    pub fn new(paths: VaultPaths, settings: Settings) -> Self {
        Self {
            backups: BackupManager::new(paths.clone(), &settings),
            restores: RestoreManager::new(paths.clone(), &settings),
            recovery: RecoveryTool::new(paths.clone(), &settings),
            paths,
            settings,
            op_lock: Mutex::new(()),
        }
    }

    /// Resolve paths from the environment and load (or default) settings
    pub fn open() -> VaultResult<Self> {
        let paths = VaultPaths::new()?;
        let settings = Settings::load_or_create(&paths)?;
        Ok(Self::new(paths, settings))
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn archives(&self) -> &ArchiveStore {
        self.backups.archives()
    }

    /// Build a snapshot of the given type, then apply its retention rule
    pub fn create_backup(&self, backup_type: BackupType) -> VaultResult<BackupOutcome> {
        let _guard = self.lock();
        self.backups.create_backup(backup_type)
    }

    /// Every archive, grouped by type, newest first within each group
    pub fn list_backups(&self) -> VaultResult<BTreeMap<BackupType, Vec<SnapshotMeta>>> {
        self.archives().list_grouped()
    }

    /// Live store health plus archive totals
    pub fn status(&self) -> VaultResult<BackupStatus> {
        let store_path = self.paths.store_file();
        let metadata = fs::metadata(&store_path).ok();

        Ok(BackupStatus {
            checked_at: Utc::now(),
            store_exists: metadata.is_some(),
            store_size_bytes: metadata.map(|m| m.len()).unwrap_or(0),
            store_healthy: check_integrity(&store_path),
            store_path,
            archives: self.archives().status()?,
        })
    }

    /// Whether the live store currently passes its integrity check
    pub fn check_store_integrity(&self) -> bool {
        check_integrity(&self.paths.store_file())
    }

    /// Read-only diagnosis of the live store
    pub fn diagnose(&self) -> DiagnosisReport {
        self.recovery.diagnose()
    }

    /// Restore the live store from an archive
    ///
    /// An unconfirmed call is rejected before the lock is even taken.
    pub fn restore(&self, reference: &str, confirmed: bool) -> VaultResult<RestoreOperation> {
        if !confirmed {
            return self.restores.restore(reference, false);
        }
        let _guard = self.lock();
        self.restores.restore(reference, true)
    }

    /// Recover what can be read from the live store into new files
    pub fn attempt_repair(&self, make_safety_copy: bool) -> VaultResult<RepairOutcome> {
        let _guard = self.lock();
        self.recovery.attempt_repair(make_safety_copy)
    }

    /// Replace the live store from a validated archive
    pub fn rebuild_from_backup(&self, reference: &str) -> VaultResult<RebuildOutcome> {
        let _guard = self.lock();
        self.recovery.rebuild_from_backup(reference)
    }

    /// Write a recovery report and return its path
    pub fn write_report(&self) -> VaultResult<PathBuf> {
        self.recovery.report()
    }

    /// Recovery tooling, for read-only use such as building a report in memory
    pub fn recovery(&self) -> &RecoveryTool {
        &self.recovery
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // A panic mid-operation leaves nothing half-published, so the lock stays usable
        self.op_lock.lock().unwrap_or_else(|poisoned| {
            debug!("operation lock was poisoned, continuing");
            poisoned.into_inner()
        })
    }
}

/// Fail unless `init` has created the directory layout
pub fn ensure_initialized(paths: &VaultPaths) -> VaultResult<()> {
    if paths.is_initialized() {
        Ok(())
    } else {
        Err(VaultError::Precondition(format!(
            "{} is not initialized; run `streakvault init` first",
            paths.base_dir().display()
        )))
    }
}
