//! Path management for streakvault
//!
//! Resolves every location the backup subsystem touches: the live store,
//! the per-type archive folders, the staging area and the recovery folder.
//!
//! ## Path Resolution Order
//!
//! 1. `STREAKVAULT_HOME` environment variable (if set)
//! 2. The platform data directory from `directories` (`~/.local/share/streakvault`
//!    on Linux, `~/Library/Application Support/streakvault` on macOS,
//!    `%APPDATA%\streakvault\data` on Windows)

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::VaultError;
use crate::models::BackupType;

/// File name of the live store inside the data directory
pub const STORE_FILE_NAME: &str = "recovery.db";

/// Manages all paths used by streakvault
#[derive(Debug, Clone)]
pub struct VaultPaths {
    /// Base directory for all streakvault data
    base_dir: PathBuf,
}

impl VaultPaths {
    /// Create a new VaultPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, VaultError> {
        let base_dir = if let Ok(custom) = std::env::var("STREAKVAULT_HOME") {
            PathBuf::from(custom)
        } else {
            ProjectDirs::from("", "", "streakvault")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| {
                    VaultError::Config("Could not determine a home directory".into())
                })?
        };

        Ok(Self { base_dir })
    }

    /// Create VaultPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Resolve a path relative to the base directory (absolute paths pass through)
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Get the data directory holding the live store
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Get the path of the live store
    pub fn store_file(&self) -> PathBuf {
        self.data_dir().join(STORE_FILE_NAME)
    }

    /// Get the root of the archive tree
    pub fn backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Get the archive folder for one backup type
    pub fn type_dir(&self, backup_type: BackupType) -> PathBuf {
        self.backup_dir().join(backup_type.as_str())
    }

    /// Get the directory where staging and extraction directories are created
    pub fn work_dir(&self) -> PathBuf {
        self.base_dir.join("work")
    }

    /// Get the directory for repair output and recovery reports
    pub fn recovery_dir(&self) -> PathBuf {
        self.base_dir.join("recovery")
    }

    /// Get the directory scanned for recent log files
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Ensure all required directories exist
    ///
    /// Creates the base, data, work and recovery directories and one
    /// archive folder per backup type.
    pub fn ensure_directories(&self) -> Result<(), VaultError> {
        let mut dirs = vec![
            self.base_dir.clone(),
            self.data_dir(),
            self.work_dir(),
            self.recovery_dir(),
        ];
        dirs.extend(BackupType::ALL.iter().map(|t| self.type_dir(*t)));

        for dir in dirs {
            std::fs::create_dir_all(&dir).map_err(|e| {
                VaultError::Io(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }

    /// Check if streakvault has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}
