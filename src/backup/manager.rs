//! Backup manager for streakvault
//!
//! Creates snapshots and enforces the retention policy for their type as one
//! unit. Retention only ever runs after a successful build.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::config::paths::VaultPaths;
use crate::config::settings::Settings;
use crate::error::VaultResult;
use crate::models::{BackupType, SnapshotMeta};

use super::archive::{ArchiveStore, RetentionReport};
use super::builder::SnapshotBuilder;

/// Result of one successful backup
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    /// The archive just published
    pub snapshot: SnapshotMeta,
    /// What the retention sweep that followed did
    pub retention: RetentionReport,
}

/// Manages backup creation and retention
pub struct BackupManager {
    paths: VaultPaths,
    builder: SnapshotBuilder,
    archives: ArchiveStore,
}

impl BackupManager {
    /// Create a new BackupManager
    pub fn new(paths: VaultPaths, settings: &Settings) -> Self {
        Self {
            builder: SnapshotBuilder::new(paths.clone(), settings),
            archives: ArchiveStore::new(paths.clone(), settings.retention.clone()),
            paths,
        }
    }

    /// Create a backup and then enforce the retention policy for its type
    pub fn create_backup(&self, backup_type: BackupType) -> VaultResult<BackupOutcome> {
        self.create_backup_protecting(backup_type, &[])
    }

    /// Like `create_backup`, but the sweep also spares the given paths
    ///
    /// Restore uses this so the emergency sweep cannot remove the archive
    /// about to be restored.
    pub fn create_backup_protecting(
        &self,
        backup_type: BackupType,
        protect: &[PathBuf],
    ) -> VaultResult<BackupOutcome> {
        let snapshot = self.builder.build(backup_type).map_err(|e| {
            error!(%backup_type, error = %e, "backup failed");
            e
        })?;

        let mut protected = protect.to_vec();
        protected.push(snapshot.path.clone());

        // The backup already succeeded; a failed sweep must not undo that
        let retention = match self.archives.enforce_retention(backup_type, &protected) {
            Ok(report) => report,
            Err(e) => {
                warn!(%backup_type, error = %e, "retention sweep failed");
                RetentionReport {
                    removed: Vec::new(),
                    failed: vec![(self.paths.type_dir(backup_type), e.to_string())],
                }
            }
        };

        info!(
            %backup_type,
            path = %snapshot.path.display(),
            pruned = retention.removed.len(),
            "backup created"
        );

        Ok(BackupOutcome {
            snapshot,
            retention,
        })
    }

    /// Archive store backing this manager
    pub fn archives(&self) -> &ArchiveStore {
        &self.archives
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::RetentionRule;
    use crate::test_support::{sample_env, truncate_in_half};

    #[test]
    fn test_create_backup() {
        let (paths, settings, _temp) = sample_env(3, 5);
        let manager = BackupManager::new(paths, &settings);

        let outcome = manager.create_backup(BackupType::Manual).unwrap();
        assert!(outcome.snapshot.path.exists());
        assert!(outcome.retention.removed.is_empty());
    }

    #[test]
    fn test_retention_runs_after_build() {
        let (paths, mut settings, _temp) = sample_env(1, 1);
        settings.retention.manual = RetentionRule::MaxCount(2);
        let manager = BackupManager::new(paths, &settings);

        for _ in 0..3 {
            manager.create_backup(BackupType::Manual).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let last = manager.create_backup(BackupType::Manual).unwrap();

        assert_eq!(last.retention.removed.len(), 1);
        assert!(!last.retention.removed.contains(&last.snapshot.path));
        let remaining = manager.archives().list(Some(BackupType::Manual)).unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].path, last.snapshot.path);
    }

    #[test]
    fn test_failed_build_skips_retention() {
        let (paths, mut settings, _temp) = sample_env(1, 1);
        settings.retention.daily = RetentionRule::MaxCount(1);
        let manager = BackupManager::new(paths.clone(), &settings);

        manager.create_backup(BackupType::Daily).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        manager.create_backup(BackupType::Daily).unwrap();
        truncate_in_half(&paths.store_file());

        assert!(manager.create_backup(BackupType::Daily).is_err());
        assert_eq!(
            manager.archives().list(Some(BackupType::Daily)).unwrap().len(),
            1
        );
    }
}
