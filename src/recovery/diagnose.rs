//! Store diagnostics
//!
//! Read-only inspection of the live store: can it be found and opened, does
//! it pass its integrity check, what schema does it report, and is the data
//! inside consistent.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::settings::StoreLayout;
use crate::integrity::integrity_messages;
use crate::storage::sqlite::{self, open_read_only, quote_ident, ColumnInfo};

use super::RecoveryTool;

/// Integrity messages beyond this many are summarized
const MAX_REPORTED_MESSAGES: usize = 5;

/// Data consistency counters; `None` when the check could not run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyStats {
    pub user_rows: Option<u64>,
    /// Users sharing a key that must be unique
    pub duplicate_user_keys: Option<u64>,
    pub entry_rows: Option<u64>,
    /// Entries whose content is NULL or blank
    pub empty_entries: Option<u64>,
    /// Entries pointing at a user row that does not exist
    pub orphaned_entries: Option<u64>,
    pub foreign_key_violations: Option<u64>,
}

/// Everything `diagnose` learned about the live store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisReport {
    pub checked_at: DateTime<Utc>,
    pub store_path: PathBuf,
    pub exists: bool,
    pub accessible: bool,
    pub integrity_ok: bool,
    /// Raw messages from the engine's integrity check
    pub integrity_messages: Vec<String>,
    /// Columns of every readable table
    pub schema: BTreeMap<String, Vec<ColumnInfo>>,
    pub consistency: ConsistencyStats,
    pub corruption_indicators: Vec<String>,
    /// Most preferred first
    pub repair_recommendations: Vec<String>,
}

impl DiagnosisReport {
    fn new(store_path: PathBuf) -> Self {
        Self {
            checked_at: Utc::now(),
            store_path,
            exists: false,
            accessible: false,
            integrity_ok: false,
            integrity_messages: Vec::new(),
            schema: BTreeMap::new(),
            consistency: ConsistencyStats::default(),
            corruption_indicators: Vec::new(),
            repair_recommendations: Vec::new(),
        }
    }

    /// True when nothing at all looked wrong
    pub fn is_healthy(&self) -> bool {
        self.exists && self.accessible && self.integrity_ok && self.corruption_indicators.is_empty()
    }

    /// Required tables absent from the readable schema
    pub fn missing_tables<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|t| !self.schema.contains_key(t.as_str()))
            .map(String::as_str)
            .collect()
    }
}

impl RecoveryTool {
    /// Inspect the live store without modifying it
    pub fn diagnose(&self) -> DiagnosisReport {
        let store = self.paths.store_file();
        let mut report = DiagnosisReport::new(store.clone());

        report.exists = store.is_file();
        if !report.exists {
            report
                .corruption_indicators
                .push(format!("Store file missing: {}", store.display()));
        } else {
            match open_read_only(&store) {
                Ok(conn) => match read_schema_table(&conn) {
                    Ok(()) => {
                        report.accessible = true;
                        inspect(&conn, &self.layout, &mut report);
                    }
                    Err(e) if is_corruption(&e) => {
                        report.accessible = true;
                        report
                            .corruption_indicators
                            .push(format!("Store is malformed: {}", e));
                        report
                            .corruption_indicators
                            .push("Database may be corrupted - restore from backup".to_string());
                    }
                    Err(e) => {
                        report
                            .corruption_indicators
                            .push(format!("Store not accessible: {}", e));
                    }
                },
                Err(e) => {
                    report
                        .corruption_indicators
                        .push(format!("Store not accessible: {}", e));
                }
            }
        }

        let backups_available = self
            .archives
            .latest_verified()
            .map(|latest| latest.is_some())
            .unwrap_or(false);
        report.repair_recommendations = recommend(&report, &self.layout, backups_available);

        if report.is_healthy() {
            info!(path = %store.display(), "diagnosis: store healthy");
        } else {
            warn!(
                path = %store.display(),
                indicators = report.corruption_indicators.len(),
                "diagnosis found problems"
            );
        }
        report
    }
}

/// Prove the schema table can actually be read
fn read_schema_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

/// The file opened but its contents are damaged, as opposed to unreadable
fn is_corruption(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase)
    )
}

fn inspect(conn: &Connection, layout: &StoreLayout, report: &mut DiagnosisReport) {
    match integrity_messages(&report.store_path) {
        Ok(messages) => {
            report.integrity_ok = messages.len() == 1 && messages[0] == "ok";
            if !report.integrity_ok {
                for message in messages.iter().take(MAX_REPORTED_MESSAGES) {
                    report
                        .corruption_indicators
                        .push(format!("Integrity check failed: {}", message));
                }
                if messages.len() > MAX_REPORTED_MESSAGES {
                    report.corruption_indicators.push(format!(
                        "... and {} more integrity problems",
                        messages.len() - MAX_REPORTED_MESSAGES
                    ));
                }
            }
            report.integrity_messages = messages;
        }
        Err(e) => {
            report
                .corruption_indicators
                .push(format!("Integrity check could not run: {}", e));
        }
    }

    match sqlite::list_tables(conn) {
        Ok(tables) => {
            for table in tables {
                match sqlite::table_columns(conn, &table.name) {
                    Ok(columns) => {
                        report.schema.insert(table.name, columns);
                    }
                    Err(e) => report
                        .corruption_indicators
                        .push(format!("Schema of {} unreadable: {}", table.name, e)),
                }
            }
        }
        Err(e) => report
            .corruption_indicators
            .push(format!("Schema unreadable: {}", e)),
    }

    report.consistency = check_consistency(conn, layout, report);
}

fn check_consistency(
    conn: &Connection,
    layout: &StoreLayout,
    report: &mut DiagnosisReport,
) -> ConsistencyStats {
    let mut stats = ConsistencyStats::default();
    let has_column = |table: &str, column: &str| {
        report
            .schema
            .get(table)
            .map_or(false, |cols| cols.iter().any(|c| c.name == column))
    };

    let users = quote_ident(&layout.user_table);
    let entries = quote_ident(&layout.entry_table);
    let has_users = report.schema.contains_key(&layout.user_table);
    let has_entries = report.schema.contains_key(&layout.entry_table);
    let has_user_key = has_column(&layout.user_table, &layout.user_key_column);
    let has_content = has_column(&layout.entry_table, &layout.entry_content_column);
    let has_owner = has_column(&layout.entry_table, &layout.entry_owner_column);

    let mut problems = Vec::new();
    let mut count = |sql: String| match conn.query_row(&sql, [], |row| row.get::<_, i64>(0)) {
        Ok(n) => Some(n.max(0) as u64),
        Err(e) => {
            problems.push(format!("Consistency check error: {}", e));
            None
        }
    };

    if has_users {
        stats.user_rows = count(format!("SELECT COUNT(*) FROM {}", users));
        if has_user_key {
            stats.duplicate_user_keys = count(format!(
                "SELECT COUNT(*) - COUNT(DISTINCT {key}) FROM {users} WHERE {key} IS NOT NULL",
                key = quote_ident(&layout.user_key_column),
                users = users
            ));
        }
    }

    if has_entries {
        stats.entry_rows = count(format!("SELECT COUNT(*) FROM {}", entries));
        if has_content {
            stats.empty_entries = count(format!(
                "SELECT COUNT(*) FROM {entries} WHERE {c} IS NULL OR TRIM({c}) = ''",
                entries = entries,
                c = quote_ident(&layout.entry_content_column)
            ));
        }
        if has_owner && has_users {
            stats.orphaned_entries = count(format!(
                "SELECT COUNT(*) FROM {entries} WHERE {owner} NOT IN (SELECT rowid FROM {users})",
                entries = entries,
                owner = quote_ident(&layout.entry_owner_column),
                users = users
            ));
        }
    }

    stats.foreign_key_violations = match conn.prepare("PRAGMA foreign_key_check") {
        Ok(mut stmt) => match stmt.query_map([], |_| Ok(())) {
            Ok(rows) => Some(rows.count() as u64),
            Err(e) => {
                problems.push(format!("Foreign key check error: {}", e));
                None
            }
        },
        Err(e) => {
            problems.push(format!("Foreign key check error: {}", e));
            None
        }
    };

    if let Some(n) = stats.duplicate_user_keys.filter(|n| *n > 0) {
        problems.push(format!("Duplicate users detected: {}", n));
    }
    if let Some(n) = stats.orphaned_entries.filter(|n| *n > 0) {
        problems.push(format!("Entries without a user: {}", n));
    }
    if let Some(n) = stats.foreign_key_violations.filter(|n| *n > 0) {
        problems.push(format!("Foreign key violations: {}", n));
    }

    report.corruption_indicators.extend(problems);
    stats
}

/// Ranked advice: restore beats engine repair, which beats a manual rebuild
fn recommend(report: &DiagnosisReport, layout: &StoreLayout, backups_available: bool) -> Vec<String> {
    let mut recs = Vec::new();
    let restore = if backups_available {
        "Restore from the most recent verified backup (restore latest --confirm)"
    } else {
        "Restore from a backup (none found under the backup directory)"
    };

    if !report.exists {
        recs.push(restore.to_string());
        recs.push("Check whether the store file was moved or deleted".to_string());
    } else if !report.accessible {
        recs.push("Check file permissions and free disk space".to_string());
        recs.push(restore.to_string());
    } else if !report.integrity_ok {
        recs.push(restore.to_string());
        recs.push("Attempt engine-level repair into a new file (repair)".to_string());
        recs.push("Rebuild the store manually from a backup archive (rebuild <archive>)".to_string());
    } else if !report.corruption_indicators.is_empty() {
        recs.push("Review the data issues above, then take a manual backup".to_string());
    }

    if report.exists && report.accessible {
        let missing = report.missing_tables(&layout.required_tables);
        if !missing.is_empty() {
            recs.push(format!("Recreate missing tables: {}", missing.join(", ")));
        }
    }

    recs
}
