//! Repair and rebuild
//!
//! Repair never writes to the damaged store: it reads whatever it still can
//! and writes the result somewhere new under the recovery directory.
//! Rebuild replaces the live store with a validated copy from an archive.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backup::{install_store, ExtractedSnapshot};
use crate::error::{VaultError, VaultResult};
use crate::integrity::check_integrity;
use crate::models::SnapshotMeta;
use crate::storage::sqlite::{
    self, open_read_only, quote_ident, value_to_csv_field, value_to_json,
};
use crate::storage::{file_stamp, write_json_atomic};

use super::RecoveryTool;

/// Which repair tier produced the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairTier {
    /// Schema and rows copied into a fresh store file
    Transcribed,
    /// Per-table JSON and CSV files for manual reimport
    Exported,
}

/// What could not be carried over from one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLoss {
    pub table: String,
    /// Rows that did make it
    pub recovered_rows: u64,
    pub reason: String,
}

/// Result of a repair attempt that recovered something
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub tier: RepairTier,
    /// Recovered store file (Transcribed) or export directory (Exported)
    pub output: PathBuf,
    pub safety_copy: Option<PathBuf>,
    pub tables_recovered: usize,
    pub rows_recovered: u64,
    /// Every table that lost rows or could not be read
    pub losses: Vec<TableLoss>,
}

impl RepairOutcome {
    /// Some tables or rows could not be recovered
    pub fn is_partial(&self) -> bool {
        !self.losses.is_empty()
    }
}

/// Result of replacing the live store from an archive
#[derive(Debug, Clone)]
pub struct RebuildOutcome {
    pub source: SnapshotMeta,
    /// Copy of the store that was replaced, if there was one
    pub side_copy: Option<PathBuf>,
    pub table_counts: BTreeMap<String, u64>,
}

/// `export_summary.json` written next to a Tier B export
#[derive(Debug, Serialize, Deserialize)]
struct ExportSummary {
    exported_at: DateTime<Utc>,
    source: PathBuf,
    tables: BTreeMap<String, u64>,
    losses: Vec<TableLoss>,
}

#[derive(Debug, Serialize)]
struct TableFile<'a> {
    columns: &'a [String],
    rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Default)]
struct Salvage {
    tables: usize,
    rows: u64,
    losses: Vec<TableLoss>,
}

impl RecoveryTool {
    /// Recover what can still be read from the live store
    ///
    /// Tier A transcribes schema and rows into `recovery/recovered_<ts>.db`.
    /// Tier B runs only when Tier A recovered no rows and exports each
    /// readable table as JSON and CSV. The damaged file is only ever opened
    /// read-only.
    pub fn attempt_repair(&self, make_safety_copy: bool) -> VaultResult<RepairOutcome> {
        let store = self.paths.store_file();
        if !store.is_file() {
            return Err(VaultError::Precondition(format!(
                "No store to repair at {}",
                store.display()
            )));
        }

        let recovery_dir = self.paths.recovery_dir();
        fs::create_dir_all(&recovery_dir).map_err(|e| VaultError::staging(&recovery_dir, e))?;
        let stamp = file_stamp(Utc::now());

        let safety_copy = if make_safety_copy {
            let copy = recovery_dir.join(format!("pre_repair_{}.db", stamp));
            fs::copy(&store, &copy).map_err(|e| VaultError::staging(&copy, e))?;
            info!(path = %copy.display(), "safety copy taken before repair");
            Some(copy)
        } else {
            None
        };

        let recovered = recovery_dir.join(format!("recovered_{}.db", stamp));
        let tier_a_failure = match transcribe(&store, &recovered) {
            Ok(salvage) if salvage.rows > 0 => {
                log_losses(&salvage.losses);
                info!(
                    path = %recovered.display(),
                    tables = salvage.tables,
                    rows = salvage.rows,
                    "repair transcribed store"
                );
                return Ok(RepairOutcome {
                    tier: RepairTier::Transcribed,
                    output: recovered,
                    safety_copy,
                    tables_recovered: salvage.tables,
                    rows_recovered: salvage.rows,
                    losses: salvage.losses,
                });
            }
            Ok(_) => "transcription found no rows".to_string(),
            Err(e) => format!("transcription failed: {}", e),
        };
        warn!(cause = %tier_a_failure, "falling back to table export");
        let _ = fs::remove_file(&recovered);

        let export_dir = recovery_dir.join(format!("data_export_{}", stamp));
        match export_tables(&store, &export_dir) {
            Ok(salvage) if salvage.rows > 0 => {
                log_losses(&salvage.losses);
                info!(
                    path = %export_dir.display(),
                    tables = salvage.tables,
                    rows = salvage.rows,
                    "repair exported readable tables"
                );
                Ok(RepairOutcome {
                    tier: RepairTier::Exported,
                    output: export_dir,
                    safety_copy,
                    tables_recovered: salvage.tables,
                    rows_recovered: salvage.rows,
                    losses: salvage.losses,
                })
            }
            other => {
                let _ = fs::remove_dir_all(&export_dir);
                let tier_b_failure = match other {
                    Ok(_) => "export found no rows".to_string(),
                    Err(e) => format!("export failed: {}", e),
                };
                Err(VaultError::Repair(format!(
                    "{}; {}",
                    tier_a_failure, tier_b_failure
                )))
            }
        }
    }

    /// Replace the live store with the copy inside an archive
    ///
    /// The candidate must pass its integrity check, hold every required
    /// table, and contain at least one user before the live store is
    /// touched. The replaced store is kept as `<store>.backup_<ts>`.
    pub fn rebuild_from_backup(&self, reference: &str) -> VaultResult<RebuildOutcome> {
        let source = self.archives.resolve(reference)?;
        info!(source = %source.path.display(), "rebuild from backup requested");

        let extracted = ExtractedSnapshot::extract(&self.paths, &source.path)?;
        let candidate = extracted.store_path()?;
        let table_counts = self.validate_candidate(&candidate)?;

        let live = self.paths.store_file();
        let side_copy = install_store(&candidate, &live, "backup", Utc::now())?;

        if !check_integrity(&live) {
            return Err(VaultError::Integrity(format!(
                "Rebuilt store at {} failed its post-install integrity check",
                live.display()
            )));
        }

        info!(
            source = %source.filename,
            tables = table_counts.len(),
            "store rebuilt from backup"
        );
        Ok(RebuildOutcome {
            source,
            side_copy,
            table_counts,
        })
    }

    fn validate_candidate(&self, candidate: &Path) -> VaultResult<BTreeMap<String, u64>> {
        if !check_integrity(candidate) {
            return Err(VaultError::Integrity(
                "Backup store failed its integrity check".into(),
            ));
        }

        let conn = open_read_only(candidate)?;
        let mut missing = Vec::new();
        for table in &self.layout.required_tables {
            if !sqlite::table_exists(&conn, table)? {
                missing.push(table.as_str());
            }
        }
        if !missing.is_empty() {
            return Err(VaultError::Integrity(format!(
                "Backup store is missing required tables: {}",
                missing.join(", ")
            )));
        }

        let counts = crate::backup::export::count_tables(&conn)?;
        if counts.get(&self.layout.user_table).copied().unwrap_or(0) == 0 {
            return Err(VaultError::Integrity(format!(
                "Backup store has no rows in {}",
                self.layout.user_table
            )));
        }

        Ok(counts)
    }
}

/// Tier A: copy readable schema and rows into a new store file
fn transcribe(source: &Path, dest: &Path) -> VaultResult<Salvage> {
    let src = open_read_only(source)?;
    let tables = sqlite::list_tables(&src)?;

    let mut out = Connection::open(dest)?;
    let tx = out.transaction()?;
    let mut salvage = Salvage::default();

    for table in tables {
        let Some(create_sql) = &table.sql else {
            continue;
        };
        if let Err(e) = tx.execute_batch(create_sql) {
            salvage.losses.push(TableLoss {
                table: table.name.clone(),
                recovered_rows: 0,
                reason: format!("schema could not be recreated: {}", e),
            });
            continue;
        }

        let rows = match sqlite::read_table(&src, &table.name) {
            Ok(rows) => rows,
            Err(e) => {
                salvage.losses.push(TableLoss {
                    table: table.name.clone(),
                    recovered_rows: 0,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&table.name),
            rows.columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            vec!["?"; rows.columns.len()].join(", ")
        );
        let mut stmt = tx.prepare(&insert)?;

        let mut copied = 0u64;
        let mut rejected = 0u64;
        for row in &rows.rows {
            match stmt.execute(rusqlite::params_from_iter(row.iter())) {
                Ok(_) => copied += 1,
                Err(e) => {
                    debug!(table = %table.name, error = %e, "row rejected during transcription");
                    rejected += 1;
                }
            }
        }
        drop(stmt);

        if let Some(err) = rows.error {
            salvage.losses.push(TableLoss {
                table: table.name.clone(),
                recovered_rows: copied,
                reason: format!("read stopped early: {}", err),
            });
        } else if rejected > 0 {
            salvage.losses.push(TableLoss {
                table: table.name.clone(),
                recovered_rows: copied,
                reason: format!("{} rows rejected on insert", rejected),
            });
        }

        salvage.tables += 1;
        salvage.rows += copied;
    }

    // Indexes, views and triggers are nice to have
    if let Ok(statements) = sqlite::list_secondary_objects(&src) {
        for statement in statements {
            if let Err(e) = tx.execute_batch(&statement) {
                debug!(error = %e, "secondary object not recreated");
            }
        }
    }

    tx.commit()?;
    Ok(salvage)
}

/// Tier B: write each readable table as `<table>.json` and `<table>.csv`
fn export_tables(source: &Path, dest_dir: &Path) -> VaultResult<Salvage> {
    let src = open_read_only(source)?;
    let tables = sqlite::list_tables(&src)?;
    fs::create_dir_all(dest_dir).map_err(|e| VaultError::staging(dest_dir, e))?;

    let mut salvage = Salvage::default();
    let mut counts = BTreeMap::new();

    for table in tables {
        let rows = match sqlite::read_table(&src, &table.name) {
            Ok(rows) => rows,
            Err(e) => {
                salvage.losses.push(TableLoss {
                    table: table.name.clone(),
                    recovered_rows: 0,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let file_stem = sanitize_file_stem(&table.name);

        write_json_atomic(
            dest_dir.join(format!("{}.json", file_stem)),
            &TableFile {
                columns: &rows.columns,
                rows: rows
                    .rows
                    .iter()
                    .map(|row| row.iter().map(value_to_json).collect())
                    .collect(),
            },
        )?;

        let csv_path = dest_dir.join(format!("{}.csv", file_stem));
        let mut writer =
            csv::Writer::from_path(&csv_path).map_err(|e| VaultError::staging(&csv_path, e))?;
        writer
            .write_record(&rows.columns)
            .map_err(|e| VaultError::staging(&csv_path, e))?;
        for row in &rows.rows {
            writer
                .write_record(row.iter().map(value_to_csv_field))
                .map_err(|e| VaultError::staging(&csv_path, e))?;
        }
        writer.flush().map_err(|e| VaultError::staging(&csv_path, e))?;

        let exported = rows.rows.len() as u64;
        if let Some(err) = rows.error {
            salvage.losses.push(TableLoss {
                table: table.name.clone(),
                recovered_rows: exported,
                reason: format!("read stopped early: {}", err),
            });
        }

        counts.insert(table.name, exported);
        salvage.tables += 1;
        salvage.rows += exported;
    }

    write_json_atomic(
        dest_dir.join("export_summary.json"),
        &ExportSummary {
            exported_at: Utc::now(),
            source: source.to_path_buf(),
            tables: counts,
            losses: salvage.losses.clone(),
        },
    )?;

    Ok(salvage)
}

fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

fn log_losses(losses: &[TableLoss]) {
    for loss in losses {
        warn!(
            table = %loss.table,
            recovered = loss.recovered_rows,
            reason = %loss.reason,
            "partial recovery"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupManager;
    use crate::config::Settings;
    use crate::models::BackupType;
    use crate::test_support::{add_user, create_sample_store, sample_env, truncate_in_half};
    use tempfile::TempDir;

    #[test]
    fn test_transcribe_healthy_store() {
        let (paths, settings, _temp) = sample_env(3, 5);
        let before = fs::read(paths.store_file()).unwrap();
        let tool = RecoveryTool::new(paths.clone(), &settings);

        let outcome = tool.attempt_repair(true).unwrap();

        assert_eq!(outcome.tier, RepairTier::Transcribed);
        assert_eq!(outcome.rows_recovered, 8);
        assert_eq!(outcome.tables_recovered, 4);
        assert!(!outcome.is_partial());
        assert!(check_integrity(&outcome.output));
        assert_eq!(fs::read(paths.store_file()).unwrap(), before);
        assert_eq!(fs::read(outcome.safety_copy.unwrap()).unwrap(), before);

        let conn = Connection::open(&outcome.output).unwrap();
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .unwrap();
        assert_eq!(users, 3);
    }

    #[test]
    fn test_repair_never_touches_damaged_store() {
        let (paths, settings, _temp) = sample_env(3, 5);
        truncate_in_half(&paths.store_file());
        let before = fs::read(paths.store_file()).unwrap();
        let tool = RecoveryTool::new(paths.clone(), &settings);

        let result = tool.attempt_repair(false);

        assert_eq!(fs::read(paths.store_file()).unwrap(), before);
        match result {
            Ok(outcome) => {
                assert!(outcome.safety_copy.is_none());
                assert!(outcome.output.starts_with(paths.recovery_dir()));
            }
            Err(e) => assert!(matches!(e, VaultError::Repair(_)), "unexpected error: {}", e),
        }
    }

    #[test]
    fn test_partial_transcription_lists_losses() {
        let (paths, settings, _temp) = sample_env(2, 3);
        {
            let conn = Connection::open(paths.store_file()).unwrap();
            conn.execute_batch(
                "CREATE TABLE streak_goals (id INTEGER PRIMARY KEY, days INTEGER CHECK (days > 0));
                 INSERT INTO streak_goals (days) VALUES (30), (90);
                 PRAGMA ignore_check_constraints = ON;
                 INSERT INTO streak_goals (days) VALUES (-1), (0);",
            )
            .unwrap();
        }
        let tool = RecoveryTool::new(paths.clone(), &settings);

        let outcome = tool.attempt_repair(false).unwrap();

        assert_eq!(outcome.tier, RepairTier::Transcribed);
        assert!(outcome.is_partial());
        assert_eq!(outcome.tables_recovered, 5);
        assert_eq!(outcome.rows_recovered, 7);
        assert_eq!(outcome.losses.len(), 1);
        let loss = &outcome.losses[0];
        assert_eq!(loss.table, "streak_goals");
        assert_eq!(loss.recovered_rows, 2);
        assert!(loss.reason.contains("2 rows rejected"));

        let conn = Connection::open(&outcome.output).unwrap();
        let goals: i64 = conn
            .query_row("SELECT COUNT(*) FROM streak_goals", [], |r| r.get(0))
            .unwrap();
        assert_eq!(goals, 2);
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .unwrap();
        assert_eq!(users, 2);
    }

    #[test]
    fn test_rebuild_parks_live_journal_with_side_copy() {
        let (paths, settings, _temp) = sample_env(2, 2);
        let manual = BackupManager::new(paths.clone(), &settings)
            .create_backup(BackupType::Manual)
            .unwrap()
            .snapshot;
        let live = paths.store_file();
        let mut wal = live.as_os_str().to_os_string();
        wal.push("-wal");
        let wal = PathBuf::from(wal);
        fs::write(&wal, b"live wal").unwrap();

        let tool = RecoveryTool::new(paths.clone(), &settings);
        let outcome = tool.rebuild_from_backup(&manual.filename).unwrap();

        let mut parked = outcome.side_copy.unwrap().into_os_string();
        parked.push("-wal");
        assert!(!wal.exists());
        assert_eq!(fs::read(PathBuf::from(parked)).unwrap(), b"live wal");
    }

    #[test]
    fn test_garbage_store_fails_both_tiers() {
        let (paths, settings, _temp) = sample_env(1, 1);
        fs::write(paths.store_file(), vec![0xAB; 4096]).unwrap();
        let tool = RecoveryTool::new(paths.clone(), &settings);

        let err = tool.attempt_repair(false).unwrap_err();
        assert!(matches!(err, VaultError::Repair(_)));
        let leftovers: Vec<_> = fs::read_dir(paths.recovery_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_export_tables_writes_json_and_csv() {
        let temp = TempDir::new().unwrap();
        let store = temp.path().join("recovery.db");
        create_sample_store(&store, 2, 3);
        let out = temp.path().join("export");

        let salvage = export_tables(&store, &out).unwrap();
        assert_eq!(salvage.rows, 5);
        assert!(out.join("users.json").exists());
        assert!(out.join("export_summary.json").exists());

        let csv = fs::read_to_string(out.join("journal_entries.csv")).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("id,user_id,telegram_id,entry_text"));
        assert_eq!(lines.count(), 3);
    }

    #[test]
    fn test_rebuild_from_backup() {
        let (paths, settings, _temp) = sample_env(3, 5);
        let manual = BackupManager::new(paths.clone(), &settings)
            .create_backup(BackupType::Manual)
            .unwrap()
            .snapshot;
        let good = fs::read(paths.store_file()).unwrap();
        truncate_in_half(&paths.store_file());
        let damaged = fs::read(paths.store_file()).unwrap();

        let tool = RecoveryTool::new(paths.clone(), &settings);
        let outcome = tool.rebuild_from_backup(&manual.filename).unwrap();

        assert_eq!(fs::read(paths.store_file()).unwrap(), good);
        assert_eq!(fs::read(outcome.side_copy.unwrap()).unwrap(), damaged);
        assert_eq!(outcome.table_counts["users"], 3);
    }

    #[test]
    fn test_rebuild_rejects_backup_without_users() {
        let (paths, settings, _temp) = sample_env(0, 0);
        let empty = BackupManager::new(paths.clone(), &settings)
            .create_backup(BackupType::Manual)
            .unwrap()
            .snapshot;
        add_user(&paths.store_file(), 5150);
        let before = fs::read(paths.store_file()).unwrap();

        let tool = RecoveryTool::new(paths.clone(), &Settings::default());
        let err = tool.rebuild_from_backup(&empty.filename).unwrap_err();
        assert!(err.is_integrity());
        assert_eq!(fs::read(paths.store_file()).unwrap(), before);
    }
}
