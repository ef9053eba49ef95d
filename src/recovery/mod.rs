//! Recovery tooling for a damaged live store
//!
//! `RecoveryTool` diagnoses the store, repairs what it can into new files,
//! rebuilds the store from an archive, and writes reports for an operator.

mod diagnose;
mod repair;
mod report;

use crate::backup::ArchiveStore;
use crate::config::paths::VaultPaths;
use crate::config::settings::{Settings, StoreLayout};

pub use diagnose::{ConsistencyStats, DiagnosisReport};
pub use repair::{RebuildOutcome, RepairOutcome, RepairTier, TableLoss};
pub use report::{EnvironmentInfo, RecoveryOption, RecoveryReport};

/// Diagnoses, repairs and rebuilds the live store
pub struct RecoveryTool {
    paths: VaultPaths,
    layout: StoreLayout,
    fresh_backup_hours: u32,
    archives: ArchiveStore,
}

impl RecoveryTool {
    /// Create a new RecoveryTool
    pub fn new(paths: VaultPaths, settings: &Settings) -> Self {
        Self {
            archives: ArchiveStore::new(paths.clone(), settings.retention.clone()),
            layout: settings.store.clone(),
            fresh_backup_hours: settings.fresh_backup_hours,
            paths,
        }
    }
}
