//! Archive store
//!
//! Owns the on-disk layout of published snapshots: one folder per backup
//! type, one zip per snapshot. Listing is forgiving (a damaged archive
//! degrades to what the filesystem knows about it) and retention never
//! touches protected paths.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::config::paths::VaultPaths;
use crate::config::settings::{RetentionPolicy, RetentionRule};
use crate::error::{VaultError, VaultResult};
use crate::models::{parse_snapshot_filename, BackupType, Manifest, SnapshotMeta, MANIFEST_FILE};

/// Outcome of one retention sweep
#[derive(Debug, Default, Clone)]
pub struct RetentionReport {
    /// Archives deleted
    pub removed: Vec<PathBuf>,
    /// Archives that should have been deleted but could not be, with the cause
    pub failed: Vec<(PathBuf, String)>,
}

impl RetentionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Aggregate view of every published archive
#[derive(Debug, Clone, Default)]
pub struct ArchiveStatus {
    pub total_count: usize,
    pub total_bytes: u64,
    pub per_type: BTreeMap<BackupType, usize>,
    /// Most recently modified archive across all types
    pub most_recent: Option<SnapshotMeta>,
}

/// Lists, resolves and prunes published snapshots
pub struct ArchiveStore {
    paths: VaultPaths,
    retention: RetentionPolicy,
}

impl ArchiveStore {
    /// Create a new ArchiveStore
    pub fn new(paths: VaultPaths, retention: RetentionPolicy) -> Self {
        Self { paths, retention }
    }

    /// List archives newest first, of one type or of all types
    pub fn list(&self, backup_type: Option<BackupType>) -> VaultResult<Vec<SnapshotMeta>> {
        let types: Vec<BackupType> = match backup_type {
            Some(t) => vec![t],
            None => BackupType::ALL.to_vec(),
        };

        let mut snapshots = Vec::new();
        for t in types {
            snapshots.extend(self.list_type_dir(t)?);
        }

        sort_newest_first(&mut snapshots);
        Ok(snapshots)
    }

    /// List archives grouped by type, each group newest first
    pub fn list_grouped(&self) -> VaultResult<BTreeMap<BackupType, Vec<SnapshotMeta>>> {
        let mut grouped = BTreeMap::new();
        for backup_type in BackupType::ALL {
            grouped.insert(backup_type, self.list(Some(backup_type))?);
        }
        Ok(grouped)
    }

    /// Newest archive of one type
    pub fn latest_of(&self, backup_type: BackupType) -> VaultResult<Option<SnapshotMeta>> {
        Ok(self.list(Some(backup_type))?.into_iter().next())
    }

    /// Newest archive of any type whose store was verified healthy at capture
    pub fn latest_verified(&self) -> VaultResult<Option<SnapshotMeta>> {
        Ok(self
            .list(None)?
            .into_iter()
            .find(SnapshotMeta::integrity_verified))
    }

    /// Turn a user-supplied reference into a published archive
    ///
    /// Accepts `latest` (the newest verified archive), a path to an existing
    /// archive, or the filename of an archive in any type folder.
    pub fn resolve(&self, reference: &str) -> VaultResult<SnapshotMeta> {
        let reference = reference.trim();

        if reference.eq_ignore_ascii_case("latest") {
            return self.latest_verified()?.ok_or_else(|| {
                VaultError::snapshot_not_found("latest (no archive passed its integrity check)")
            });
        }

        let as_path = PathBuf::from(reference);
        if as_path.is_file() {
            let backup_type = as_path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<BackupType>().ok())
                .or_else(|| {
                    as_path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .and_then(parse_snapshot_filename)
                        .map(|(t, _)| t)
                })
                .unwrap_or(BackupType::Manual);
            return describe(&as_path, backup_type)
                .ok_or_else(|| VaultError::snapshot_not_found(reference));
        }

        for backup_type in BackupType::ALL {
            let candidate = self.paths.type_dir(backup_type).join(reference);
            if candidate.is_file() {
                if let Some(meta) = describe(&candidate, backup_type) {
                    return Ok(meta);
                }
            }
        }

        Err(VaultError::snapshot_not_found(reference))
    }

    /// Delete archives of one type that fall outside its retention rule
    ///
    /// Paths in `protect` are never removed. A failed delete is recorded in
    /// the report and does not stop the sweep.
    pub fn enforce_retention(
        &self,
        backup_type: BackupType,
        protect: &[PathBuf],
    ) -> VaultResult<RetentionReport> {
        let snapshots = self.list(Some(backup_type))?;
        let rule = self.retention.rule_for(backup_type);
        let now = Utc::now();

        let expired: Vec<&SnapshotMeta> = match rule {
            RetentionRule::MaxCount(keep) => snapshots.iter().skip(keep as usize).collect(),
            RetentionRule::MaxAgeDays(days) => {
                let cutoff = now - Duration::days(i64::from(days));
                snapshots.iter().filter(|s| s.created_at < cutoff).collect()
            }
        };

        let mut report = RetentionReport::default();
        for snapshot in expired {
            if is_protected(&snapshot.path, protect) {
                debug!(path = %snapshot.path.display(), "retention skipped protected archive");
                continue;
            }

            match fs::remove_file(&snapshot.path) {
                Ok(()) => report.removed.push(snapshot.path.clone()),
                Err(e) => {
                    warn!(path = %snapshot.path.display(), error = %e, "failed to delete expired archive");
                    report.failed.push((snapshot.path.clone(), e.to_string()));
                }
            }
        }

        if !report.removed.is_empty() {
            info!(
                %backup_type,
                removed = report.removed.len(),
                ?rule,
                "retention sweep removed archives"
            );
        }

        Ok(report)
    }

    /// Count and size of every archive, plus the most recently modified one
    pub fn status(&self) -> VaultResult<ArchiveStatus> {
        let mut status = ArchiveStatus::default();
        let mut newest: Option<(SystemTime, SnapshotMeta)> = None;

        for backup_type in BackupType::ALL {
            let snapshots = self.list(Some(backup_type))?;
            status.per_type.insert(backup_type, snapshots.len());

            for snapshot in snapshots {
                status.total_count += 1;
                status.total_bytes += snapshot.size_bytes;

                let modified = fs::metadata(&snapshot.path)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                    newest = Some((modified, snapshot));
                }
            }
        }

        status.most_recent = newest.map(|(_, s)| s);
        Ok(status)
    }

    fn list_type_dir(&self, backup_type: BackupType) -> VaultResult<Vec<SnapshotMeta>> {
        let dir = self.paths.type_dir(backup_type);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&dir)
            .map_err(|e| VaultError::Io(format!("Failed to read {}: {}", dir.display(), e)))?
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "zip") {
                continue;
            }

            if let Some(meta) = describe(&path, backup_type) {
                snapshots.push(meta);
            }
        }

        Ok(snapshots)
    }
}

/// Read the manifest embedded in an archive
pub fn read_manifest(path: &Path) -> VaultResult<Manifest> {
    let file = File::open(path)
        .map_err(|e| VaultError::Archive(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut archive = ZipArchive::new(file)?;
    let mut entry = archive.by_name(MANIFEST_FILE)?;

    let mut contents = String::new();
    entry
        .read_to_string(&mut contents)
        .map_err(|e| VaultError::Archive(format!("Failed to read manifest: {}", e)))?;

    Ok(serde_json::from_str(&contents)?)
}

/// Unpack an archive into `dest`
pub fn extract_archive(path: &Path, dest: &Path) -> VaultResult<()> {
    let file = File::open(path)
        .map_err(|e| VaultError::Archive(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut archive = ZipArchive::new(file)?;
    archive.extract(dest)?;
    Ok(())
}

/// Build the listing entry for one archive
///
/// Falls back to the filename timestamp, then the file's mtime, when the
/// manifest cannot be read. Returns `None` only when the file itself is gone.
fn describe(path: &Path, backup_type: BackupType) -> Option<SnapshotMeta> {
    let metadata = fs::metadata(path).ok()?;
    let filename = path.file_name()?.to_string_lossy().into_owned();

    let manifest = match read_manifest(path) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "archive manifest unreadable, listing from filesystem");
            None
        }
    };

    let created_at = manifest
        .as_ref()
        .map(|m| m.created_at)
        .or_else(|| parse_snapshot_filename(&filename).map(|(_, at)| at))
        .or_else(|| metadata.modified().ok().map(DateTime::<Utc>::from))
        .unwrap_or_else(Utc::now);

    Some(SnapshotMeta {
        filename,
        path: path.to_path_buf(),
        backup_type,
        created_at,
        size_bytes: metadata.len(),
        manifest,
    })
}

fn sort_newest_first(snapshots: &mut [SnapshotMeta]) {
    snapshots.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.filename.cmp(&a.filename))
    });
}

fn is_protected(path: &Path, protect: &[PathBuf]) -> bool {
    let canonical = fs::canonicalize(path).ok();
    protect.iter().any(|p| {
        p == path
            || match (&canonical, fs::canonicalize(p).ok()) {
                (Some(a), Some(b)) => *a == b,
                _ => false,
            }
    })
}
