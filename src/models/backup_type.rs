//! Backup type model
//!
//! Every archive belongs to exactly one type; each type has its own folder
//! and its own retention rule.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// The kind of snapshot, which decides where it lives and how long it is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    /// Created by the daily schedule or the overdue check
    Daily,
    /// Created by the weekly schedule
    Weekly,
    /// Requested by an operator
    Manual,
    /// Created before a destructive operation or after detecting corruption
    Emergency,
}

impl BackupType {
    /// All backup types, in folder order
    pub const ALL: [BackupType; 4] = [
        BackupType::Daily,
        BackupType::Weekly,
        BackupType::Manual,
        BackupType::Emergency,
    ];

    /// Folder and filename component for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Manual => "manual",
            Self::Emergency => "emergency",
        }
    }

    /// Whether a build of this type may capture a store that failed its
    /// integrity check
    pub fn may_capture_unhealthy(&self) -> bool {
        matches!(self, Self::Emergency)
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "manual" => Ok(Self::Manual),
            "emergency" => Ok(Self::Emergency),
            other => Err(VaultError::Precondition(format!(
                "Unknown backup type '{}' (expected daily, weekly, manual or emergency)",
                other
            ))),
        }
    }
}
