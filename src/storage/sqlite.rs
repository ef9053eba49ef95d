//! SQLite helpers for the live store
//!
//! The store schema belongs to the application, not to this crate, so
//! everything here works from what `sqlite_master` and `PRAGMA table_info`
//! report at runtime: tables are read as ordered column names plus rows of
//! dynamically typed values.

use std::path::Path;

use base64::Engine;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// A table definition as recorded in `sqlite_master`
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    /// `CREATE TABLE` statement, absent for some internal tables
    pub sql: Option<String>,
}

/// One column as reported by `PRAGMA table_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub decl_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Every readable row of one table
#[derive(Debug, Clone, Default)]
pub struct TableRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Set when reading stopped early; rows read before the failure are kept
    pub error: Option<String>,
}

/// Open a store without any chance of modifying it
///
/// Fails when the file does not exist.
pub fn open_read_only(path: &Path) -> VaultResult<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| VaultError::Database(format!("Failed to open {}: {}", path.display(), e)))
}

/// Quote an identifier for interpolation into SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// List user tables (internal `sqlite_*` tables excluded), ordered by name
pub fn list_tables(conn: &Connection) -> VaultResult<Vec<TableDef>> {
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;

    let tables = stmt
        .query_map([], |row| {
            Ok(TableDef {
                name: row.get(0)?,
                sql: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tables)
}

/// List `CREATE` statements for indexes, triggers and views
pub fn list_secondary_objects(conn: &Connection) -> VaultResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT sql FROM sqlite_master \
         WHERE type IN ('index', 'trigger', 'view') AND sql IS NOT NULL \
         ORDER BY CASE type WHEN 'view' THEN 0 WHEN 'index' THEN 1 ELSE 2 END, name",
    )?;

    let statements = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(statements)
}

/// Describe the columns of one table
pub fn table_columns(conn: &Connection, table: &str) -> VaultResult<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;

    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                decl_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                primary_key: row.get::<_, i64>(5)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(columns)
}

/// Count the rows of one table
pub fn count_rows(conn: &Connection, table: &str) -> VaultResult<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

/// Whether a table exists in the store
pub fn table_exists(conn: &Connection, table: &str) -> VaultResult<bool> {
    let found: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(found > 0)
}

/// Read every row of one table
///
/// Errors before the first row are returned; an error part-way through is
/// recorded in `TableRows::error` and the rows read so far are kept.
pub fn read_table(conn: &Connection, table: &str) -> VaultResult<TableRows> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut result = TableRows {
        columns,
        ..TableRows::default()
    };

    let mut rows = stmt.query([])?;
    loop {
        match rows.next() {
            Ok(Some(row)) => {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    match row.get_ref(i) {
                        Ok(value) => values.push(Value::from(value)),
                        Err(e) => {
                            result.error = Some(e.to_string());
                            return Ok(result);
                        }
                    }
                }
                result.rows.push(values);
            }
            Ok(None) => break,
            Err(e) => {
                result.error = Some(e.to_string());
                break;
            }
        }
    }

    Ok(result)
}

/// Convert a stored value into JSON
///
/// Blobs become `{"base64": "..."}` so they survive a JSON round trip.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(f) => serde_json::Value::from(*f),
        Value::Text(s) => serde_json::Value::from(s.as_str()),
        Value::Blob(b) => serde_json::json!({
            "base64": base64::engine::general_purpose::STANDARD.encode(b)
        }),
    }
}

/// Render a stored value as a SQL literal
pub fn value_to_sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) if f.is_finite() => format!("{:?}", f),
        Value::Real(_) => "NULL".to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(b) => format!("X'{}'", hex::encode(b)),
    }
}

/// Render a stored value as a plain CSV field
pub fn value_to_csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => hex::encode(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_db(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "
            CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, avatar BLOB);
            CREATE TABLE \"odd \"\"name\" (v REAL);
            CREATE INDEX idx_users_name ON users(name);
            INSERT INTO users (name, avatar) VALUES ('ana', X'00FF'), ('o''neil', NULL);
            INSERT INTO \"odd \"\"name\" VALUES (1.5);
            ",
        )
        .unwrap();
    }

    #[test]
    fn test_open_read_only_missing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.db");
        assert!(open_read_only(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_list_tables_and_columns() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.db");
        sample_db(&path);

        let conn = open_read_only(&path).unwrap();
        let tables: Vec<String> = list_tables(&conn).unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(tables, vec!["odd \"name".to_string(), "users".to_string()]);

        let columns = table_columns(&conn, "users").unwrap();
        assert_eq!(columns.len(), 3);
        assert!(columns[0].primary_key);
        assert!(columns[1].not_null);

        let secondary = list_secondary_objects(&conn).unwrap();
        assert_eq!(secondary.len(), 1);
        assert!(secondary[0].contains("idx_users_name"));
    }

    #[test]
    fn test_read_table_generic_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.db");
        sample_db(&path);

        let conn = open_read_only(&path).unwrap();
        let table = read_table(&conn, "users").unwrap();
        assert_eq!(table.columns, vec!["id", "name", "avatar"]);
        assert_eq!(table.rows.len(), 2);
        assert!(table.error.is_none());
        assert_eq!(count_rows(&conn, "users").unwrap(), 2);
        assert!(table_exists(&conn, "users").unwrap());
        assert!(!table_exists(&conn, "journal_entries").unwrap());
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(value_to_sql_literal(&Value::Text("o'neil".into())), "'o''neil'");
        assert_eq!(value_to_sql_literal(&Value::Blob(vec![0, 255])), "X'00ff'");
        assert_eq!(value_to_sql_literal(&Value::Real(1.0)), "1.0");
        assert_eq!(value_to_json(&Value::Integer(7)), serde_json::json!(7));
        assert_eq!(
            value_to_json(&Value::Blob(vec![1, 2])),
            serde_json::json!({"base64": "AQI="})
        );
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
