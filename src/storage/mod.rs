//! Storage layer for streakvault
//!
//! File helpers with atomic writes and rename-based replacement, plus the
//! runtime-introspecting SQLite helpers used by exports and diagnostics.

pub mod file_io;
pub mod sqlite;

pub use file_io::{
    copy_into, file_stamp, read_json_required, replace_file_atomic, side_copy_path,
    write_json_atomic,
};
