//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup service.

pub mod backup;
pub mod recovery;
pub mod scheduler;

pub use backup::{handle_backup_command, BackupCommands};
pub use recovery::{handle_recovery_command, RecoveryCommands};
pub use scheduler::run_scheduler;
