//! File I/O utilities with atomic writes
//!
//! Provides safe file operations that won't corrupt data on failure: JSON
//! documents and whole-file replacements are written beside their target
//! and renamed into place.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{VaultError, VaultResult};

/// Read JSON from a file, returning an error if file doesn't exist
pub fn read_json_required<T, P>(path: P) -> VaultResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Err(VaultError::Io(format!("File not found: {}", path.display())));
    }

    let file = File::open(path)
        .map_err(|e| VaultError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| VaultError::Json(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write JSON to a file atomically (write to temp, then rename)
///
/// The file is either completely written or not modified at all.
pub fn write_json_atomic<T, P>(path: P, data: &T) -> VaultResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    ensure_parent(path)?;

    // Temp file in same directory (important for atomic rename)
    let temp_path = path.with_extension("json.tmp");

    let file = File::create(&temp_path)
        .map_err(|e| VaultError::staging(&temp_path, format!("create failed: {}", e)))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)
        .map_err(|e| VaultError::Json(format!("Failed to serialize {}: {}", path.display(), e)))?;

    writer
        .flush()
        .map_err(|e| VaultError::staging(&temp_path, format!("flush failed: {}", e)))?;

    // Sync to disk before rename
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| VaultError::staging(&temp_path, format!("sync failed: {}", e)))?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        VaultError::staging(path, format!("rename failed: {}", e))
    })?;

    Ok(())
}

/// Copy `src` into `dest_dir` under its own file name
///
/// Returns the path of the copy.
pub fn copy_into(src: &Path, dest_dir: &Path) -> VaultResult<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| VaultError::staging(src, "path has no file name"))?;
    let dest = dest_dir.join(name);

    fs::create_dir_all(dest_dir).map_err(|e| VaultError::staging(dest_dir, e))?;
    fs::copy(src, &dest).map_err(|e| {
        VaultError::staging(&dest, format!("copy from {} failed: {}", src.display(), e))
    })?;

    Ok(dest)
}

/// Replace `dest` with the contents of `src` in one rename
///
/// The new contents are copied into a temp file next to `dest`, synced, and
/// renamed over it, so readers see either the old file or the new one.
pub fn replace_file_atomic(src: &Path, dest: &Path) -> VaultResult<()> {
    let parent = ensure_parent(dest)?;

    let mut incoming = tempfile::Builder::new()
        .prefix(".incoming-")
        .tempfile_in(&parent)
        .map_err(|e| VaultError::staging(&parent, format!("temp file failed: {}", e)))?;

    let mut reader = File::open(src)
        .map_err(|e| VaultError::staging(src, format!("open failed: {}", e)))?;
    io::copy(&mut reader, incoming.as_file_mut())
        .map_err(|e| VaultError::staging(incoming.path(), format!("copy failed: {}", e)))?;
    incoming
        .as_file()
        .sync_all()
        .map_err(|e| VaultError::staging(incoming.path(), format!("sync failed: {}", e)))?;

    incoming
        .persist(dest)
        .map_err(|e| VaultError::staging(dest, format!("rename failed: {}", e.error)))?;

    Ok(())
}

/// Path for a timestamped side copy of `path`, e.g. `recovery.db.pre_restore_20250101_030000`
pub fn side_copy_path(path: &Path, label: &str, at: DateTime<Utc>) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}_{}", label, at.format("%Y%m%d_%H%M%S_%3f")));
    path.with_file_name(name)
}

/// Current compact timestamp used in generated file names
pub fn file_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S_%3f").to_string()
}

fn ensure_parent(path: &Path) -> VaultResult<PathBuf> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&parent).map_err(|e| {
        VaultError::staging(&parent, format!("create directory failed: {}", e))
    })?;

    Ok(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.json");

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        write_json_atomic(&path, &data).unwrap();
        assert!(path.exists());

        let loaded: TestData = read_json_required(&path).unwrap();
        assert_eq!(data, loaded);
    }

    #[test]
    fn test_atomic_write_no_temp_file_left() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.json");
        let temp_path = temp_dir.path().join("test.json.tmp");

        write_json_atomic(&path, &TestData::default()).unwrap();

        assert!(path.exists());
        assert!(!temp_path.exists());
    }

    #[test]
    fn test_read_json_required_missing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.json");
        assert!(read_json_required::<TestData, _>(&path).is_err());
    }

    #[test]
    fn test_copy_into_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("quotes.json");
        fs::write(&src, "[]").unwrap();

        let dest = copy_into(&src, &temp_dir.path().join("stage").join("data")).unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap(), "[]");
    }

    #[test]
    fn test_copy_into_reports_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let err = copy_into(&temp_dir.path().join("nope.txt"), temp_dir.path()).unwrap_err();
        assert!(matches!(err, VaultError::Staging { .. }));
    }

    #[test]
    fn test_replace_file_atomic() {
        let temp_dir = TempDir::new().unwrap();
        let live = temp_dir.path().join("data").join("live.db");
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, b"old").unwrap();
        let fresh = temp_dir.path().join("fresh.db");
        fs::write(&fresh, b"new contents").unwrap();

        replace_file_atomic(&fresh, &live).unwrap();

        assert_eq!(fs::read(&live).unwrap(), b"new contents");
        let leftovers: Vec<_> = fs::read_dir(live.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".incoming-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_side_copy_path() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let path = side_copy_path(Path::new("/srv/data/recovery.db"), "pre_restore", at);
        assert_eq!(
            path,
            PathBuf::from("/srv/data/recovery.db.pre_restore_20250304_050607_000")
        );
    }
}
