//! Shared fixtures for unit tests

use std::fs::OpenOptions;
use std::path::Path;

use rusqlite::Connection;
use tempfile::TempDir;

use crate::config::{Settings, VaultPaths};

/// Schema mirroring the bot's store: users, journal entries, relapses, check-ins
pub const SAMPLE_SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        telegram_id INTEGER UNIQUE NOT NULL,
        username TEXT,
        current_streak INTEGER DEFAULT 0,
        created_at TEXT
    );
    CREATE TABLE journal_entries (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL,
        telegram_id INTEGER NOT NULL,
        entry_text TEXT NOT NULL,
        mood_score INTEGER,
        created_at TEXT
    );
    CREATE TABLE relapse_records (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL,
        streak_broken INTEGER NOT NULL,
        notes TEXT
    );
    CREATE TABLE check_ins (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL,
        mood_score INTEGER,
        urge_level INTEGER
    );
    CREATE INDEX idx_entries_user ON journal_entries(user_id);
";

/// Create a store with `users` users and `entries` journal entries spread across them
pub fn create_sample_store(path: &Path, users: u32, entries: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SAMPLE_SCHEMA).unwrap();

    for i in 1..=users {
        conn.execute(
            "INSERT INTO users (id, telegram_id, username, current_streak, created_at) \
             VALUES (?1, ?2, ?3, ?4, '2025-01-01T00:00:00')",
            rusqlite::params![i, 1000 + i, format!("user{}", i), i * 3],
        )
        .unwrap();
    }

    for i in 1..=entries {
        let owner = if users == 0 { 1 } else { (i - 1) % users + 1 };
        conn.execute(
            "INSERT INTO journal_entries (user_id, telegram_id, entry_text, mood_score, created_at) \
             VALUES (?1, ?2, ?3, ?4, '2025-01-02T08:00:00')",
            rusqlite::params![owner, 1000 + owner, format!("day {} felt steady", i), i % 10],
        )
        .unwrap();
    }
}

/// Insert one more user, changing the store's contents
pub fn add_user(path: &Path, telegram_id: i64) {
    let conn = Connection::open(path).unwrap();
    conn.execute(
        "INSERT INTO users (telegram_id, username) VALUES (?1, 'late joiner')",
        [telegram_id],
    )
    .unwrap();
}

/// Cut the file to half its length
pub fn truncate_in_half(path: &Path) {
    let len = std::fs::metadata(path).unwrap().len();
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(len / 2).unwrap();
}

/// A fresh base directory with the standard layout and a sample store
pub fn sample_env(users: u32, entries: u32) -> (VaultPaths, Settings, TempDir) {
    let temp = TempDir::new().unwrap();
    let paths = VaultPaths::with_base_dir(temp.path().to_path_buf());
    paths.ensure_directories().unwrap();
    create_sample_store(&paths.store_file(), users, entries);
    (paths, Settings::default(), temp)
}
