//! Custom error types for streakvault
//!
//! This module defines the error hierarchy for the backup and recovery
//! subsystem using thiserror for ergonomic error definitions.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// The main error type for streakvault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Request rejected before any side effect (unconfirmed restore, bad argument)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A store failed its structural self-test
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// I/O failure while staging or installing files
    #[error("Staging error at {}: {cause}", path.display())]
    Staging { path: PathBuf, cause: String },

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// SQLite engine errors
    #[error("Database error: {0}")]
    Database(String),

    /// Zip container errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Every repair tier failed
    #[error("Repair failed: {0}")]
    Repair(String),

    /// Scheduler lifecycle errors
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl VaultError {
    /// Create a staging error for a path
    pub fn staging(path: impl AsRef<Path>, cause: impl ToString) -> Self {
        Self::Staging {
            path: path.as_ref().to_path_buf(),
            cause: cause.to_string(),
        }
    }

    /// Create a "not found" error for snapshots
    pub fn snapshot_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Snapshot",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an integrity error
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }

    /// Check if the request was rejected before any side effect
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_) | Self::NotFound { .. })
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<zip::result::ZipError> for VaultError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

/// Result type alias for streakvault operations
pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VaultError::Config("test error".into());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_not_found_error() {
        let err = VaultError::snapshot_not_found("snapshot_manual_x.zip");
        assert_eq!(err.to_string(), "Snapshot not found: snapshot_manual_x.zip");
        assert!(err.is_not_found());
        assert!(err.is_precondition());
    }

    #[test]
    fn test_staging_error_names_path() {
        let err = VaultError::staging("/tmp/stage/database", "disk full");
        assert_eq!(
            err.to_string(),
            "Staging error at /tmp/stage/database: disk full"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let vault_err: VaultError = io_err.into();
        assert!(matches!(vault_err, VaultError::Io(_)));
    }
}
