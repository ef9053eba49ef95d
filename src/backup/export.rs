//! Engine-agnostic exports bundled with every snapshot
//!
//! Two redundant copies of the store's contents that do not depend on the
//! raw file format: a statement-level SQL dump and a per-table JSON export
//! built from whatever columns the store reports at runtime.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::storage::sqlite::{
    self, list_secondary_objects, list_tables, quote_ident, read_table, value_to_json,
    value_to_sql_literal,
};

/// Per-table JSON export written as `database/tables.json`
#[derive(Debug, Serialize, Deserialize)]
pub struct TableExport {
    pub exported_at: DateTime<Utc>,
    pub tables: BTreeMap<String, ExportedTable>,
}

/// Ordered columns and rows of one table
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Write a statement-level dump of the whole store
///
/// The dump recreates tables, rows, then views, indexes and triggers inside
/// a single transaction.
pub fn write_sql_dump(conn: &Connection, dest: &Path) -> VaultResult<()> {
    let file = File::create(dest).map_err(|e| VaultError::staging(dest, e))?;
    let mut out = BufWriter::new(file);
    let io_err = |e: std::io::Error| VaultError::staging(dest, e);

    writeln!(out, "-- streakvault SQL dump").map_err(io_err)?;
    writeln!(out, "PRAGMA foreign_keys=OFF;").map_err(io_err)?;
    writeln!(out, "BEGIN TRANSACTION;").map_err(io_err)?;

    for table in list_tables(conn)? {
        let Some(create_sql) = &table.sql else {
            continue;
        };
        writeln!(out, "{};", create_sql).map_err(io_err)?;

        let rows = read_table(conn, &table.name)?;
        if let Some(err) = rows.error {
            return Err(VaultError::Database(format!(
                "Failed to dump table {}: {}",
                table.name, err
            )));
        }

        let column_list = rows
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        for row in &rows.rows {
            let values = row
                .iter()
                .map(value_to_sql_literal)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                out,
                "INSERT INTO {} ({}) VALUES ({});",
                quote_ident(&table.name),
                column_list,
                values
            )
            .map_err(io_err)?;
        }
    }

    for statement in list_secondary_objects(conn)? {
        writeln!(out, "{};", statement).map_err(io_err)?;
    }

    writeln!(out, "COMMIT;").map_err(io_err)?;
    out.flush().map_err(io_err)?;

    Ok(())
}

/// Write every table as ordered columns plus rows of JSON values
///
/// Returns the number of rows exported per table.
pub fn write_table_export(conn: &Connection, dest: &Path) -> VaultResult<BTreeMap<String, u64>> {
    let mut tables = BTreeMap::new();
    let mut counts = BTreeMap::new();

    for table in list_tables(conn)? {
        let rows = read_table(conn, &table.name)?;
        if let Some(err) = rows.error {
            return Err(VaultError::Database(format!(
                "Failed to export table {}: {}",
                table.name, err
            )));
        }

        counts.insert(table.name.clone(), rows.rows.len() as u64);
        tables.insert(
            table.name,
            ExportedTable {
                columns: rows.columns,
                rows: rows
                    .rows
                    .iter()
                    .map(|row| row.iter().map(value_to_json).collect())
                    .collect(),
            },
        );
    }

    let export = TableExport {
        exported_at: Utc::now(),
        tables,
    };

    let file = File::create(dest).map_err(|e| VaultError::staging(dest, e))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, &export)?;
    out.flush().map_err(|e| VaultError::staging(dest, e))?;

    Ok(counts)
}

/// Count the rows of every table
pub fn count_tables(conn: &Connection) -> VaultResult<BTreeMap<String, u64>> {
    let mut counts = BTreeMap::new();
    for table in list_tables(conn)? {
        let count = sqlite::count_rows(conn, &table.name)?;
        counts.insert(table.name, count);
    }
    Ok(counts)
}
