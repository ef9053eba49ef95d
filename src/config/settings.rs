//! Operator settings for streakvault
//!
//! Manages the retention policy, the backup schedule, the store layout the
//! diagnostics rely on, and the small files bundled next to the store.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use super::paths::VaultPaths;
use crate::error::VaultError;
use crate::models::BackupType;

/// How long archives of one type are kept
///
/// Count and age are separate controls; each type picks exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionRule {
    /// Keep the newest N archives
    MaxCount(u32),
    /// Keep archives younger than N days
    MaxAgeDays(u32),
}

impl RetentionRule {
    fn validate(&self, backup_type: BackupType) -> Result<(), VaultError> {
        match self {
            Self::MaxCount(0) | Self::MaxAgeDays(0) => Err(VaultError::Config(format!(
                "Retention for {} backups must be at least 1",
                backup_type
            ))),
            _ => Ok(()),
        }
    }
}

/// Backup retention settings, one rule per type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub daily: RetentionRule,
    pub weekly: RetentionRule,
    pub manual: RetentionRule,
    pub emergency: RetentionRule,
}

impl RetentionPolicy {
    /// Get the rule for one backup type
    pub fn rule_for(&self, backup_type: BackupType) -> RetentionRule {
        match backup_type {
            BackupType::Daily => self.daily,
            BackupType::Weekly => self.weekly,
            BackupType::Manual => self.manual,
            BackupType::Emergency => self.emergency,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            daily: RetentionRule::MaxCount(7),
            weekly: RetentionRule::MaxCount(4),
            manual: RetentionRule::MaxCount(10),
            emergency: RetentionRule::MaxCount(3),
        }
    }
}

/// When scheduled backups and health checks run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Local time of the daily backup (HH:MM)
    #[serde(default = "default_daily_at")]
    pub daily_at: String,

    /// Day of the weekly backup (e.g. "sunday")
    #[serde(default = "default_weekly_day")]
    pub weekly_day: String,

    /// Local time of the weekly backup (HH:MM)
    #[serde(default = "default_weekly_at")]
    pub weekly_at: String,

    /// Minutes between health checks
    #[serde(default = "default_health_interval")]
    pub health_interval_minutes: u32,

    /// Hours without a successful daily backup before one is forced
    #[serde(default = "default_overdue_after")]
    pub overdue_after_hours: u32,
}

fn default_daily_at() -> String {
    "03:00".to_string()
}

fn default_weekly_day() -> String {
    "sunday".to_string()
}

fn default_weekly_at() -> String {
    "02:00".to_string()
}

fn default_health_interval() -> u32 {
    60
}

fn default_overdue_after() -> u32 {
    25
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            daily_at: default_daily_at(),
            weekly_day: default_weekly_day(),
            weekly_at: default_weekly_at(),
            health_interval_minutes: default_health_interval(),
            overdue_after_hours: default_overdue_after(),
        }
    }
}

impl ScheduleSettings {
    /// Parsed daily backup time
    pub fn daily_time(&self) -> Result<NaiveTime, VaultError> {
        parse_clock_time(&self.daily_at)
    }

    /// Parsed weekly backup time
    pub fn weekly_time(&self) -> Result<NaiveTime, VaultError> {
        parse_clock_time(&self.weekly_at)
    }

    /// Parsed weekly backup day
    pub fn weekday(&self) -> Result<Weekday, VaultError> {
        Weekday::from_str(self.weekly_day.trim()).map_err(|_| {
            VaultError::Config(format!("Invalid weekly backup day: {}", self.weekly_day))
        })
    }
}

fn parse_clock_time(raw: &str) -> Result<NaiveTime, VaultError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| VaultError::Config(format!("Invalid time '{}', expected HH:MM", raw)))
}

/// Which tables and columns the manifest counts and diagnostics inspect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreLayout {
    #[serde(default = "default_user_table")]
    pub user_table: String,

    /// Column that must be unique per user
    #[serde(default = "default_user_key_column")]
    pub user_key_column: String,

    #[serde(default = "default_entry_table")]
    pub entry_table: String,

    /// Column holding the journal text
    #[serde(default = "default_entry_content_column")]
    pub entry_content_column: String,

    /// Column in the entry table pointing at the user row id
    #[serde(default = "default_entry_owner_column")]
    pub entry_owner_column: String,

    /// Tables a backup must contain to be used for a rebuild
    #[serde(default = "default_required_tables")]
    pub required_tables: Vec<String>,
}

fn default_user_table() -> String {
    "users".to_string()
}

fn default_user_key_column() -> String {
    "telegram_id".to_string()
}

fn default_entry_table() -> String {
    "journal_entries".to_string()
}

fn default_entry_content_column() -> String {
    "entry_text".to_string()
}

fn default_entry_owner_column() -> String {
    "user_id".to_string()
}

fn default_required_tables() -> Vec<String> {
    vec![default_user_table(), default_entry_table()]
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            user_table: default_user_table(),
            user_key_column: default_user_key_column(),
            entry_table: default_entry_table(),
            entry_content_column: default_entry_content_column(),
            entry_owner_column: default_entry_owner_column(),
            required_tables: default_required_tables(),
        }
    }
}

/// Small files bundled next to the store in every archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AncillaryFiles {
    /// Configuration files, relative to the base directory
    #[serde(default = "default_config_files")]
    pub config_files: Vec<PathBuf>,

    /// Static data files, relative to the base directory
    #[serde(default = "default_data_files")]
    pub data_files: Vec<PathBuf>,

    /// Only logs modified within this many days are bundled
    #[serde(default = "default_log_window")]
    pub log_window_days: u32,
}

fn default_config_files() -> Vec<PathBuf> {
    vec![PathBuf::from("config.json")]
}

fn default_data_files() -> Vec<PathBuf> {
    vec![
        PathBuf::from("data/quotes.json"),
        PathBuf::from("data/tips.json"),
    ]
}

fn default_log_window() -> u32 {
    30
}

impl Default for AncillaryFiles {
    fn default() -> Self {
        Self {
            config_files: default_config_files(),
            data_files: default_data_files(),
            log_window_days: default_log_window(),
        }
    }
}

/// Operator settings for streakvault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Retention rule per backup type
    #[serde(default)]
    pub retention: RetentionPolicy,

    /// Backup and health check schedule
    #[serde(default)]
    pub schedule: ScheduleSettings,

    /// Tables and columns the diagnostics inspect
    #[serde(default)]
    pub store: StoreLayout,

    /// Files archived next to the store
    #[serde(default)]
    pub ancillary: AncillaryFiles,

    /// Backups younger than this are recommended in recovery reports
    #[serde(default = "default_fresh_backup_hours")]
    pub fresh_backup_hours: u32,
}

fn default_schema_version() -> u32 {
    1
}

fn default_fresh_backup_hours() -> u32 {
    24
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            retention: RetentionPolicy::default(),
            schedule: ScheduleSettings::default(),
            store: StoreLayout::default(),
            ancillary: AncillaryFiles::default(),
            fresh_backup_hours: default_fresh_backup_hours(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &VaultPaths) -> Result<Self, VaultError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path).map_err(|e| {
                VaultError::Io(format!("Failed to read settings file: {}", e))
            })?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                VaultError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            settings.validate()?;
            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &VaultPaths) -> Result<(), VaultError> {
        paths.ensure_directories()?;
        crate::storage::write_json_atomic(paths.settings_file(), self)
    }

    /// Reject settings the scheduler or retention sweep cannot honor
    pub fn validate(&self) -> Result<(), VaultError> {
        for backup_type in BackupType::ALL {
            self.retention.rule_for(backup_type).validate(backup_type)?;
        }

        self.schedule.daily_time()?;
        self.schedule.weekly_time()?;
        self.schedule.weekday()?;

        if self.schedule.health_interval_minutes == 0 {
            return Err(VaultError::Config(
                "Health check interval must be at least one minute".into(),
            ));
        }

        Ok(())
    }
}
