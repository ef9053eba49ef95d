//! Recovery report
//!
//! A JSON snapshot of the diagnosis, the environment and the ranked recovery
//! options, written for an operator to act on.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{VaultError, VaultResult};
use crate::models::BackupType;
use crate::storage::{file_stamp, write_json_atomic};

use super::diagnose::DiagnosisReport;
use super::RecoveryTool;

/// Order in which backup-based options are listed
const OPTION_ORDER: [BackupType; 4] = [
    BackupType::Emergency,
    BackupType::Daily,
    BackupType::Weekly,
    BackupType::Manual,
];

/// Where things are and how much backup coverage exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub store_path: PathBuf,
    pub store_size_bytes: u64,
    pub backup_dir: PathBuf,
    pub recovery_dir: PathBuf,
    pub available_backups: usize,
    pub producer_version: String,
    pub os: String,
}

/// One way out, tagged with whether it is advised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOption {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_hours: Option<f64>,
    pub recommended: bool,
}

/// Everything written to `recovery_report_<ts>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub report_date: DateTime<Utc>,
    pub diagnosis: DiagnosisReport,
    pub environment: EnvironmentInfo,
    pub recovery_options: Vec<RecoveryOption>,
}

impl RecoveryTool {
    /// Assemble a report without writing it
    pub fn build_report(&self) -> VaultResult<RecoveryReport> {
        Ok(RecoveryReport {
            report_date: Utc::now(),
            diagnosis: self.diagnose(),
            environment: self.environment()?,
            recovery_options: self.recovery_options()?,
        })
    }

    /// Write a report into the recovery directory and return its path
    pub fn report(&self) -> VaultResult<PathBuf> {
        let report = self.build_report()?;

        let recovery_dir = self.paths.recovery_dir();
        fs::create_dir_all(&recovery_dir).map_err(|e| VaultError::staging(&recovery_dir, e))?;
        let path = recovery_dir.join(format!(
            "recovery_report_{}.json",
            file_stamp(report.report_date)
        ));
        write_json_atomic(&path, &report)?;

        info!(path = %path.display(), "recovery report written");
        Ok(path)
    }

    fn environment(&self) -> VaultResult<EnvironmentInfo> {
        let store_path = self.paths.store_file();
        Ok(EnvironmentInfo {
            store_size_bytes: fs::metadata(&store_path).map(|m| m.len()).unwrap_or(0),
            store_path,
            backup_dir: self.paths.backup_dir(),
            recovery_dir: self.paths.recovery_dir(),
            available_backups: self.archives.list(None)?.len(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
        })
    }

    fn recovery_options(&self) -> VaultResult<Vec<RecoveryOption>> {
        let now = Utc::now();
        let fresh_hours = f64::from(self.fresh_backup_hours);
        let mut options = Vec::new();

        for backup_type in OPTION_ORDER {
            if let Some(latest) = self.archives.latest_of(backup_type)? {
                let age_hours = latest.age(now).num_seconds() as f64 / 3600.0;
                let verified = latest.integrity_verified();
                let mut description =
                    format!("Restore from {} backup {}", backup_type, latest.filename);
                if !verified {
                    description.push_str(" (captured without a passing integrity check)");
                }
                options.push(RecoveryOption {
                    kind: format!("restore_from_{}", backup_type),
                    description,
                    file: Some(latest.path),
                    age_hours: Some(age_hours),
                    recommended: verified && age_hours < fresh_hours,
                });
            }
        }

        options.extend([
            RecoveryOption {
                kind: "database_repair".into(),
                description: "Attempt engine-level repair into a new file".into(),
                file: None,
                age_hours: None,
                recommended: true,
            },
            RecoveryOption {
                kind: "data_export".into(),
                description: "Export readable tables for manual reimport".into(),
                file: None,
                age_hours: None,
                recommended: false,
            },
            RecoveryOption {
                kind: "fresh_start".into(),
                description: "Start over with an empty store".into(),
                file: None,
                age_hours: None,
                recommended: false,
            },
        ]);

        Ok(options)
    }
}
