//! Snapshot and manifest models
//!
//! A snapshot is one zip archive. The manifest is embedded in it as
//! `manifest.json` and describes where it came from and what it holds.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::backup_type::BackupType;

/// Name of the manifest entry inside every archive
pub const MANIFEST_FILE: &str = "manifest.json";

/// Prefix of every archive filename
pub const SNAPSHOT_PREFIX: &str = "snapshot";

/// Extension of every published archive
pub const SNAPSHOT_EXTENSION: &str = "zip";

const FILENAME_TIMESTAMP: &str = "%Y%m%d_%H%M%S_%3f";

/// Provenance record embedded in each archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Type the archive was created as
    pub backup_type: BackupType,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
    /// Version of the producing system
    pub producer_version: String,
    /// Live store path at capture time
    pub source_path: PathBuf,
    /// Rows in the configured user table
    pub user_count: u64,
    /// Rows in the configured journal entry table
    pub entry_count: u64,
    /// Row count of every table that could be counted
    #[serde(default)]
    pub table_counts: BTreeMap<String, u64>,
    /// Store file size at capture time
    pub store_size_bytes: u64,
    /// Whether the store passed its integrity check before capture
    pub integrity_verified: bool,
    /// Every relative path bundled inside the archive
    pub files_included: Vec<String>,
    /// Degraded steps that did not abort the build
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Metadata about one published archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Archive filename
    pub filename: String,
    /// Full path to the archive
    pub path: PathBuf,
    /// Type folder the archive lives in
    pub backup_type: BackupType,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
    /// Size of the archive in bytes
    pub size_bytes: u64,
    /// Embedded manifest, if it could be read
    pub manifest: Option<Manifest>,
}

impl SnapshotMeta {
    /// Whether the store was verified healthy when this snapshot was taken
    pub fn integrity_verified(&self) -> bool {
        self.manifest
            .as_ref()
            .map_or(false, |m| m.integrity_verified)
    }

    /// Age of the snapshot relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.created_at)
    }
}

/// Build the archive filename for a snapshot taken at `created_at`
pub fn snapshot_filename(backup_type: BackupType, created_at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.{}",
        SNAPSHOT_PREFIX,
        backup_type,
        created_at.format(FILENAME_TIMESTAMP),
        SNAPSHOT_EXTENSION
    )
}

/// Parse the type and timestamp embedded in an archive filename
///
/// Accepts `snapshot_<type>_<YYYYmmdd_HHMMSS_mmm>.zip`, optionally with a
/// `-N` collision suffix before the extension.
pub fn parse_snapshot_filename(filename: &str) -> Option<(BackupType, DateTime<Utc>)> {
    let stem = filename
        .strip_prefix(SNAPSHOT_PREFIX)?
        .strip_prefix('_')?
        .strip_suffix(SNAPSHOT_EXTENSION)?
        .strip_suffix('.')?;

    let (type_part, rest) = stem.split_once('_')?;
    let backup_type = type_part.parse::<BackupType>().ok()?;

    let timestamp = rest.split('-').next()?;
    let naive = NaiveDateTime::parse_from_str(timestamp, FILENAME_TIMESTAMP).ok()?;

    Some((backup_type, naive.and_utc()))
}
