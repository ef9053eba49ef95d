//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tempfile::TempDir;

use streakvault::config::{Settings, VaultPaths};
use streakvault::service::BackupService;

const SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        telegram_id INTEGER UNIQUE NOT NULL,
        username TEXT,
        current_streak INTEGER DEFAULT 0
    );
    CREATE TABLE journal_entries (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL,
        telegram_id INTEGER NOT NULL,
        entry_text TEXT NOT NULL,
        mood_score INTEGER
    );
    CREATE TABLE relapse_records (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL, notes TEXT);
    CREATE TABLE check_ins (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL, mood_score INTEGER);
";

/// A base directory holding an initialized layout and a populated store
pub struct Fixture {
    pub temp: TempDir,
    pub paths: VaultPaths,
}

impl Fixture {
    pub fn new(users: u32, entries: u32) -> Self {
        let temp = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp.path().to_path_buf());
        Settings::default().save(&paths).unwrap();
        write_store(&paths.store_file(), users, entries);
        Self { temp, paths }
    }

    pub fn base(&self) -> &Path {
        self.temp.path()
    }

    pub fn store(&self) -> PathBuf {
        self.paths.store_file()
    }

    pub fn service(&self) -> BackupService {
        BackupService::new(self.paths.clone(), Settings::default())
    }
}

pub fn write_store(path: &Path, users: u32, entries: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    for i in 1..=users {
        conn.execute(
            "INSERT INTO users (id, telegram_id, username, current_streak) VALUES (?1, ?2, ?3, ?4)",
            params![i, 5000 + i, format!("member{}", i), i],
        )
        .unwrap();
    }
    for i in 1..=entries {
        let owner = (i - 1) % users.max(1) + 1;
        conn.execute(
            "INSERT INTO journal_entries (user_id, telegram_id, entry_text, mood_score) \
             VALUES (?1, ?2, ?3, ?4)",
            params![owner, 5000 + owner, format!("entry {}", i), 7],
        )
        .unwrap();
    }
}

pub fn user_count(path: &Path) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
        .unwrap()
}

pub fn truncate_in_half(path: &Path) {
    let len = fs::metadata(path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(path)
        .unwrap()
        .set_len(len / 2)
        .unwrap();
}
