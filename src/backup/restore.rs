//! Backup restoration for streakvault
//!
//! Swaps the live store for the copy held in an archive. Every confirmed
//! restore first captures the current state as an emergency snapshot, then
//! validates the incoming store before it is installed and again after.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::paths::VaultPaths;
use crate::config::settings::{AncillaryFiles, Settings};
use crate::error::{VaultError, VaultResult};
use crate::integrity::check_integrity;
use crate::models::{BackupType, Manifest, SnapshotMeta, MANIFEST_FILE};
use crate::storage::{read_json_required, replace_file_atomic, side_copy_path};

use super::archive::extract_archive;
use super::builder::{CONFIG_DIR, DATABASE_DIR, DATA_DIR};
use super::manager::BackupManager;

/// Journal files SQLite may leave next to a store
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// A snapshot unpacked into a scratch directory, removed on drop
pub struct ExtractedSnapshot {
    dir: TempDir,
    store_name: String,
    /// Manifest from the archive, if it could be read
    pub manifest: Option<Manifest>,
}

impl ExtractedSnapshot {
    /// Unpack `archive` under the work directory
    pub fn extract(paths: &VaultPaths, archive: &Path) -> VaultResult<Self> {
        let work_dir = paths.work_dir();
        fs::create_dir_all(&work_dir).map_err(|e| VaultError::staging(&work_dir, e))?;
        let dir = tempfile::Builder::new()
            .prefix("restore-")
            .tempdir_in(&work_dir)
            .map_err(|e| VaultError::staging(&work_dir, e))?;

        extract_archive(archive, dir.path())?;

        let manifest = match read_json_required::<Manifest, _>(dir.path().join(MANIFEST_FILE)) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(archive = %archive.display(), error = %e, "extracted archive has no readable manifest");
                None
            }
        };

        let store_name = paths
            .store_file()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            dir,
            store_name,
            manifest,
        })
    }

    /// Root of the unpacked tree
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The raw store copy inside the unpacked tree
    pub fn store_path(&self) -> VaultResult<PathBuf> {
        let path = self.dir.path().join(DATABASE_DIR).join(&self.store_name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(VaultError::Archive(format!(
                "Archive holds no store copy at {}/{}",
                DATABASE_DIR, self.store_name
            )))
        }
    }
}

/// Record of a completed restore
#[derive(Debug, Clone)]
pub struct RestoreOperation {
    pub id: Uuid,
    /// Archive the store was restored from
    pub target: SnapshotMeta,
    /// Emergency snapshot of the state that was replaced
    pub pre_restore_snapshot: SnapshotMeta,
    /// Timestamped copy of the replaced store file, if one existed
    pub side_copy: Option<PathBuf>,
    pub source_manifest: Option<Manifest>,
    /// Config and data files put back in place
    pub restored_files: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl RestoreOperation {
    /// Get a summary of what was restored
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Restored {} (safety snapshot: {})",
            self.target.filename, self.pre_restore_snapshot.filename
        );
        if !self.restored_files.is_empty() {
            summary.push_str(&format!(", {} extra file(s)", self.restored_files.len()));
        }
        if !self.warnings.is_empty() {
            summary.push_str(&format!(", {} warning(s)", self.warnings.len()));
        }
        summary
    }
}

/// Handles restoring from backups
pub struct RestoreManager {
    paths: VaultPaths,
    ancillary: AncillaryFiles,
    backups: BackupManager,
}

impl RestoreManager {
    /// Create a new RestoreManager
    pub fn new(paths: VaultPaths, settings: &Settings) -> Self {
        Self {
            backups: BackupManager::new(paths.clone(), settings),
            ancillary: settings.ancillary.clone(),
            paths,
        }
    }

    /// Replace the live store with the one held in `reference`
    ///
    /// Without `confirmed` nothing is touched. Once confirmed, failure to
    /// create the emergency snapshot aborts before any change.
    pub fn restore(&self, reference: &str, confirmed: bool) -> VaultResult<RestoreOperation> {
        if !confirmed {
            return Err(VaultError::Precondition(
                "confirmation required: restoring replaces the live store; pass confirmed=true (--confirm) to proceed".into(),
            ));
        }

        let target = self.backups.archives().resolve(reference)?;
        info!(target = %target.path.display(), "restore requested");

        let safety = self
            .backups
            .create_backup_protecting(BackupType::Emergency, &[target.path.clone()])
            .map_err(|e| {
                VaultError::Precondition(format!(
                    "pre-restore emergency snapshot failed, live store left untouched: {}",
                    e
                ))
            })?;
        let pre_restore_snapshot = safety.snapshot;

        let extracted = ExtractedSnapshot::extract(&self.paths, &target.path)?;
        if let Some(manifest) = &extracted.manifest {
            info!(
                backup_type = %manifest.backup_type,
                created_at = %manifest.created_at,
                users = manifest.user_count,
                entries = manifest.entry_count,
                "restoring snapshot"
            );
        }

        let incoming = extracted.store_path()?;
        if !check_integrity(&incoming) {
            return Err(VaultError::Integrity(format!(
                "Store inside {} failed its integrity check; live store left untouched",
                target.filename
            )));
        }

        let live = self.paths.store_file();
        let now = Utc::now();
        let side_copy = install_store(&incoming, &live, "pre_restore", now)?;

        if !check_integrity(&live) {
            return Err(VaultError::Integrity(format!(
                "Restored store at {} failed its post-install integrity check; run diagnose",
                live.display()
            )));
        }

        let mut warnings = Vec::new();
        let restored_files = self.restore_ancillary(extracted.root(), &mut warnings);

        let operation = RestoreOperation {
            id: Uuid::new_v4(),
            target,
            pre_restore_snapshot,
            side_copy,
            source_manifest: extracted.manifest.clone(),
            restored_files,
            warnings,
            completed_at: Utc::now(),
        };

        info!(id = %operation.id, "{}", operation.summary());
        Ok(operation)
    }

    /// Put bundled config and data files back where the settings place them
    fn restore_ancillary(&self, root: &Path, warnings: &mut Vec<String>) -> Vec<PathBuf> {
        let mut restored = Vec::new();
        let groups = [
            (CONFIG_DIR, &self.ancillary.config_files),
            (DATA_DIR, &self.ancillary.data_files),
        ];

        for (folder, files) in groups {
            for file in files.iter() {
                let Some(name) = file.file_name() else {
                    continue;
                };
                let bundled = root.join(folder).join(name);
                if !bundled.is_file() {
                    warnings.push(format!("Not in archive, left as is: {}", file.display()));
                    continue;
                }

                let dest = self.paths.resolve(file);
                if dest == self.paths.settings_file() {
                    warnings.push(format!(
                        "Kept current tool settings, not restored: {}",
                        file.display()
                    ));
                    continue;
                }
                match replace_file_atomic(&bundled, &dest) {
                    Ok(()) => restored.push(dest),
                    Err(e) => {
                        warn!(path = %dest.display(), error = %e, "could not restore bundled file");
                        warnings.push(format!("Could not restore {}: {}", file.display(), e));
                    }
                }
            }
        }

        restored
    }
}

/// Copy the live store aside under a timestamped name before it is replaced
///
/// Journal sidecars belong to the old file, so they are moved next to the
/// copy instead of being left to pair with the new store. Returns `None`
/// when there is no live store.
pub(crate) fn set_aside_live_store(
    live: &Path,
    label: &str,
    at: DateTime<Utc>,
) -> VaultResult<Option<PathBuf>> {
    if !live.exists() {
        return Ok(None);
    }

    let side_copy = side_copy_path(live, label, at);
    fs::copy(live, &side_copy).map_err(|e| VaultError::staging(&side_copy, e))?;

    for suffix in SIDECAR_SUFFIXES {
        let sidecar = sibling_with_suffix(live, suffix);
        if sidecar.exists() {
            let moved = sibling_with_suffix(&side_copy, suffix);
            fs::rename(&sidecar, &moved).map_err(|e| VaultError::staging(&sidecar, e))?;
        }
    }

    Ok(Some(side_copy))
}

/// Set the live store aside, then put `incoming` in its place
///
/// If the replace fails the sidecars are moved back so the untouched live
/// store keeps its journal.
pub(crate) fn install_store(
    incoming: &Path,
    live: &Path,
    label: &str,
    at: DateTime<Utc>,
) -> VaultResult<Option<PathBuf>> {
    let side_copy = set_aside_live_store(live, label, at)?;

    if let Err(e) = replace_file_atomic(incoming, live) {
        if let Some(side) = &side_copy {
            put_back_sidecars(live, side);
        }
        return Err(e);
    }

    Ok(side_copy)
}

/// Move sidecars parked next to `side_copy` back beside `live`
fn put_back_sidecars(live: &Path, side_copy: &Path) {
    for suffix in SIDECAR_SUFFIXES {
        let parked = sibling_with_suffix(side_copy, suffix);
        let original = sibling_with_suffix(live, suffix);
        if !parked.exists() || original.exists() {
            continue;
        }
        if let Err(e) = fs::rename(&parked, &original) {
            warn!(path = %parked.display(), error = %e, "could not put sidecar back");
        }
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
