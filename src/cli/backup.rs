//! Backup CLI commands
//!
//! Create, list and restore archives, and show backup status.

use chrono::Utc;
use clap::Subcommand;

use crate::display::{
    format_backup_outcome, format_duration, format_restore, format_size, format_snapshot_list,
    format_status,
};
use crate::error::VaultResult;
use crate::models::BackupType;
use crate::service::BackupService;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    #[command(alias = "backup")]
    Create {
        /// Backup type: daily, weekly, manual or emergency
        #[arg(short = 't', long = "type", default_value = "manual")]
        backup_type: BackupType,
    },

    /// List all available backups, grouped by type
    List,

    /// Show live store health and archive totals
    Status,

    /// Restore the live store from a backup
    Restore {
        /// Backup filename or path (use 'latest' for the most recent verified backup)
        backup: String,

        /// Actually replace the live store
        #[arg(long)]
        confirm: bool,
    },
}

/// Handle a backup command
pub fn handle_backup_command(service: &BackupService, cmd: BackupCommands) -> VaultResult<()> {
    match cmd {
        BackupCommands::Create { backup_type } => {
            println!("Creating {} backup...", backup_type);
            let outcome = service.create_backup(backup_type)?;
            println!("{}", format_backup_outcome(&outcome));
        }

        BackupCommands::List => {
            let grouped = service.list_backups()?;
            println!("{}", format_snapshot_list(&grouped, Utc::now()));
        }

        BackupCommands::Status => {
            let status = service.status()?;
            println!("{}", format_status(&status, Utc::now()));
        }

        BackupCommands::Restore { backup, confirm } => {
            let target = service.archives().resolve(&backup)?;

            println!("Backup Information");
            println!("==================");
            println!("File: {}", target.path.display());
            println!("Type: {}", target.backup_type);
            println!(
                "Created: {} ({} ago)",
                target.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                format_duration(target.age(Utc::now()))
            );
            println!("Size: {}", format_size(target.size_bytes));
            if let Some(manifest) = &target.manifest {
                println!(
                    "Users: {}  Entries: {}",
                    manifest.user_count, manifest.entry_count
                );
            }
            println!();

            if !confirm {
                println!("WARNING: This will replace the live store!");
                println!("An emergency snapshot of the current store is taken first.");
                println!("To proceed, run again with --confirm:");
                println!("  streakvault restore {} --confirm", backup);
                return Ok(());
            }

            println!("Restoring from backup...");
            let operation = service.restore(&target.path.to_string_lossy(), true)?;
            println!("{}", format_restore(&operation));
        }
    }

    Ok(())
}
