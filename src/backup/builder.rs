//! Snapshot builder
//!
//! Stages one snapshot in a scratch directory and publishes it as a single
//! zip archive. Nothing appears at the archive's final path until the zip is
//! complete and synced; the scratch directory and any partial zip are removed
//! on every exit path.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::paths::VaultPaths;
use crate::config::settings::{AncillaryFiles, Settings, StoreLayout};
use crate::error::{VaultError, VaultResult};
use crate::integrity::check_integrity;
use crate::models::{snapshot_filename, BackupType, Manifest, SnapshotMeta, MANIFEST_FILE};
use crate::storage::copy_into;
use crate::storage::sqlite::open_read_only;

use super::export::{count_tables, write_sql_dump, write_table_export};

/// Folder inside the archive holding the store copy and its exports
pub const DATABASE_DIR: &str = "database";
/// Folder inside the archive holding configuration files
pub const CONFIG_DIR: &str = "config";
/// Folder inside the archive holding static data files
pub const DATA_DIR: &str = "data";
/// Folder inside the archive holding recent logs
pub const LOGS_DIR: &str = "logs";
/// Statement-level dump inside `database/`
pub const SQL_DUMP_FILE: &str = "dump.sql";
/// Per-table JSON export inside `database/`
pub const TABLE_EXPORT_FILE: &str = "tables.json";

/// What was learned about the store while staging it
#[derive(Debug, Default)]
struct StoreCapture {
    size_bytes: u64,
    table_counts: BTreeMap<String, u64>,
}

/// Builds and publishes snapshot archives
pub struct SnapshotBuilder {
    paths: VaultPaths,
    layout: StoreLayout,
    ancillary: AncillaryFiles,
}

impl SnapshotBuilder {
    /// Create a new SnapshotBuilder
    pub fn new(paths: VaultPaths, settings: &Settings) -> Self {
        Self {
            paths,
            layout: settings.store.clone(),
            ancillary: settings.ancillary.clone(),
        }
    }

    /// Build one snapshot of the live store and publish it under its type folder
    ///
    /// Refuses to archive a store that fails its integrity check, unless the
    /// snapshot is an emergency one; those capture whatever is on disk and
    /// record `integrity_verified = false`.
    pub fn build(&self, backup_type: BackupType) -> VaultResult<SnapshotMeta> {
        let store = self.paths.store_file();
        let healthy = check_integrity(&store);

        if !healthy && !backup_type.may_capture_unhealthy() {
            return Err(VaultError::Integrity(format!(
                "Refusing to create a {} backup: {} failed its integrity check (run diagnose first)",
                backup_type,
                store.display()
            )));
        }

        let created_at = Utc::now();
        info!(%backup_type, healthy, "starting snapshot build");

        let work_dir = self.paths.work_dir();
        fs::create_dir_all(&work_dir).map_err(|e| VaultError::staging(&work_dir, e))?;
        let staging = tempfile::Builder::new()
            .prefix("staging-")
            .tempdir_in(&work_dir)
            .map_err(|e| VaultError::staging(&work_dir, e))?;

        let mut warnings = Vec::new();

        let capture = self.stage_store(staging.path(), healthy, &mut warnings)?;
        stage_listed_files(
            &self.paths,
            &self.ancillary.config_files,
            &staging.path().join(CONFIG_DIR),
            &mut warnings,
        )?;
        stage_listed_files(
            &self.paths,
            &self.ancillary.data_files,
            &staging.path().join(DATA_DIR),
            &mut warnings,
        )?;
        self.stage_recent_logs(&staging.path().join(LOGS_DIR))?;

        let manifest = Manifest {
            backup_type,
            created_at,
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            source_path: store.clone(),
            user_count: capture
                .table_counts
                .get(&self.layout.user_table)
                .copied()
                .unwrap_or(0),
            entry_count: capture
                .table_counts
                .get(&self.layout.entry_table)
                .copied()
                .unwrap_or(0),
            table_counts: capture.table_counts,
            store_size_bytes: capture.size_bytes,
            integrity_verified: healthy,
            files_included: bundled_files(staging.path())?,
            warnings,
        };
        crate::storage::write_json_atomic(staging.path().join(MANIFEST_FILE), &manifest)?;

        let path = self.publish(staging.path(), backup_type, created_at)?;
        let size_bytes = fs::metadata(&path)
            .map_err(|e| VaultError::staging(&path, e))?
            .len();

        info!(
            path = %path.display(),
            size_bytes,
            users = manifest.user_count,
            entries = manifest.entry_count,
            "snapshot published"
        );

        Ok(SnapshotMeta {
            filename: file_name_of(&path),
            path,
            backup_type,
            created_at,
            size_bytes,
            manifest: Some(manifest),
        })
    }

    /// Copy the raw store and write both redundant exports
    fn stage_store(
        &self,
        staging: &Path,
        healthy: bool,
        warnings: &mut Vec<String>,
    ) -> VaultResult<StoreCapture> {
        let store = self.paths.store_file();
        let db_dir = staging.join(DATABASE_DIR);

        if !store.exists() {
            warn!(path = %store.display(), "store file missing, snapshot holds no database");
            warnings.push(format!("Store file missing: {}", store.display()));
            return Ok(StoreCapture::default());
        }

        let raw_copy = copy_into(&store, &db_dir)?;
        let size_bytes = fs::metadata(&raw_copy)
            .map_err(|e| VaultError::staging(&raw_copy, e))?
            .len();

        // Exports read the staged copy so they match the raw file exactly
        let exported = open_read_only(&raw_copy).and_then(|conn| {
            write_sql_dump(&conn, &db_dir.join(SQL_DUMP_FILE))?;
            write_table_export(&conn, &db_dir.join(TABLE_EXPORT_FILE))
        });

        let table_counts = match exported {
            Ok(counts) => counts,
            Err(e) if !healthy => {
                warn!(error = %e, "exports of unhealthy store failed, keeping raw copy only");
                warnings.push(format!("Export skipped: {}", e));
                for partial in [SQL_DUMP_FILE, TABLE_EXPORT_FILE] {
                    let _ = fs::remove_file(db_dir.join(partial));
                }
                open_read_only(&raw_copy)
                    .and_then(|conn| count_tables(&conn))
                    .unwrap_or_default()
            }
            Err(e) => return Err(e),
        };

        debug!(tables = table_counts.len(), size_bytes, "store staged");
        Ok(StoreCapture {
            size_bytes,
            table_counts,
        })
    }

    /// Copy `*.log` files modified within the configured window
    fn stage_recent_logs(&self, dest: &Path) -> VaultResult<()> {
        let logs_dir = self.paths.logs_dir();
        if !logs_dir.is_dir() {
            return Ok(());
        }

        let window = Duration::from_secs(u64::from(self.ancillary.log_window_days) * 24 * 60 * 60);
        let cutoff = SystemTime::now()
            .checked_sub(window)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for entry in WalkDir::new(&logs_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| VaultError::staging(&logs_dir, e))?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "log") {
                continue;
            }

            let modified = entry
                .metadata()
                .map_err(|e| VaultError::staging(path, e))?
                .modified()
                .map_err(|e| VaultError::staging(path, e))?;
            if modified >= cutoff {
                copy_into(path, dest)?;
            }
        }

        Ok(())
    }

    /// Zip the staging tree next to its final path, then rename it into place
    fn publish(
        &self,
        staging: &Path,
        backup_type: BackupType,
        created_at: DateTime<Utc>,
    ) -> VaultResult<PathBuf> {
        let type_dir = self.paths.type_dir(backup_type);
        fs::create_dir_all(&type_dir).map_err(|e| VaultError::staging(&type_dir, e))?;
        let final_path = unique_archive_path(&type_dir, &snapshot_filename(backup_type, created_at));

        let mut partial = tempfile::Builder::new()
            .prefix(".partial-")
            .suffix(".tmp")
            .tempfile_in(&type_dir)
            .map_err(|e| VaultError::staging(&type_dir, e))?;

        write_zip(staging, partial.as_file_mut())?;
        partial
            .as_file()
            .sync_all()
            .map_err(|e| VaultError::staging(partial.path(), e))?;

        // Published snapshots are immutable; never overwrite one
        partial
            .persist_noclobber(&final_path)
            .map_err(|e| VaultError::staging(&final_path, e.error))?;

        Ok(final_path)
    }
}

/// Copy each listed file into `dest`; missing files are warnings
fn stage_listed_files(
    paths: &VaultPaths,
    files: &[PathBuf],
    dest: &Path,
    warnings: &mut Vec<String>,
) -> VaultResult<()> {
    for file in files {
        let source = paths.resolve(file);
        if !source.exists() {
            debug!(path = %source.display(), "listed file not present, skipping");
            warnings.push(format!("Not found, not bundled: {}", file.display()));
            continue;
        }
        copy_into(&source, dest)?;
    }
    Ok(())
}

/// Every file under the staging tree as a sorted relative path, manifest last
fn bundled_files(staging: &Path) -> VaultResult<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(staging).min_depth(1) {
        let entry = entry.map_err(|e| VaultError::staging(staging, e))?;
        if entry.file_type().is_file() {
            files.push(archive_name(staging, entry.path())?);
        }
    }
    files.sort();
    files.push(MANIFEST_FILE.to_string());
    Ok(files)
}

fn write_zip(staging: &Path, out: &mut File) -> VaultResult<()> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(out);

    for entry in WalkDir::new(staging).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| VaultError::staging(staging, e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        zip.start_file(archive_name(staging, entry.path())?, options)?;
        let mut source =
            File::open(entry.path()).map_err(|e| VaultError::staging(entry.path(), e))?;
        io::copy(&mut source, &mut zip).map_err(|e| VaultError::staging(entry.path(), e))?;
    }

    zip.finish()?;
    Ok(())
}

/// Relative path inside the archive, always `/`-separated
fn archive_name(root: &Path, path: &Path) -> VaultResult<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| VaultError::staging(path, e))?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}

fn unique_archive_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let stem = filename.trim_end_matches(".zip");
    (2..)
        .map(|n| dir.join(format!("{}-{}.zip", stem, n)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
