//! Recovery CLI commands

use clap::Subcommand;

use crate::display::{format_diagnosis, format_rebuild, format_repair};
use crate::error::VaultResult;
use crate::service::BackupService;

/// Recovery subcommands
#[derive(Subcommand)]
pub enum RecoveryCommands {
    /// Inspect the live store without changing it
    Diagnose {
        /// Also write a recovery report
        #[arg(long)]
        report: bool,
    },

    /// Copy whatever is readable out of the live store into new files
    Repair {
        /// Skip the safety copy of the damaged store
        #[arg(long)]
        no_safety_copy: bool,
    },

    /// Replace the live store from a validated backup
    Rebuild {
        /// Backup filename or path (use 'latest' for the most recent verified backup)
        backup: String,

        /// Actually replace the live store
        #[arg(long)]
        confirm: bool,
    },

    /// Write a recovery report with diagnosis and recovery options
    Report,
}

/// Handle a recovery command
pub fn handle_recovery_command(
    service: &BackupService,
    cmd: RecoveryCommands,
) -> VaultResult<()> {
    match cmd {
        RecoveryCommands::Diagnose { report } => {
            let diagnosis = service.diagnose();
            println!("{}", format_diagnosis(&diagnosis));
            if report {
                let path = service.write_report()?;
                println!();
                println!("Report written: {}", path.display());
            }
        }

        RecoveryCommands::Repair { no_safety_copy } => {
            println!("Attempting repair...");
            let outcome = service.attempt_repair(!no_safety_copy)?;
            println!("{}", format_repair(&outcome));
        }

        RecoveryCommands::Rebuild { backup, confirm } => {
            if !confirm {
                let target = service.archives().resolve(&backup)?;
                println!("Rebuild would replace the live store with {}", target.filename);
                println!("The current store is kept beside it as a side copy.");
                println!("To proceed, run again with --confirm:");
                println!("  streakvault rebuild {} --confirm", backup);
                return Ok(());
            }
            let outcome = service.rebuild_from_backup(&backup)?;
            println!("{}", format_rebuild(&outcome));
        }

        RecoveryCommands::Report => {
            let path = service.write_report()?;
            println!("Report written: {}", path.display());
        }
    }

    Ok(())
}
