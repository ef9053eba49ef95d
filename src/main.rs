use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use streakvault::cli::{
    handle_backup_command, handle_recovery_command, run_scheduler, BackupCommands,
    RecoveryCommands,
};
use streakvault::config::{paths::VaultPaths, settings::Settings};
use streakvault::service::{ensure_initialized, BackupService};

#[derive(Parser)]
#[command(
    name = "streakvault",
    version,
    about = "Backup and recovery for the streak tracker's store",
    long_about = "streakvault snapshots the application's SQLite store together with its \
                  config, data files and recent logs, rotates the archives per type, \
                  restores from them safely, and diagnoses and repairs a damaged store."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the directory layout and default configuration
    Init,

    /// Show current configuration and paths
    Config,

    #[command(flatten)]
    Backup(BackupCommands),

    #[command(flatten)]
    Recovery(RecoveryCommands),

    /// Run scheduled backups in the foreground
    #[command(alias = "scheduler")]
    Run,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let paths = VaultPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    match cli.command {
        Some(Commands::Init) => {
            println!("Initializing streakvault at: {}", paths.base_dir().display());
            paths.ensure_directories()?;
            settings.save(&paths)?;
            println!("Initialization complete!");
            println!();
            println!("Store:   {}", paths.store_file().display());
            println!("Backups: {}", paths.backup_dir().display());
            println!();
            println!("Run 'streakvault create' to take a first backup.");
        }
        Some(Commands::Config) => {
            println!("streakvault Configuration");
            println!("=========================");
            println!("Base directory:     {}", paths.base_dir().display());
            println!("Store file:         {}", paths.store_file().display());
            println!("Backup directory:   {}", paths.backup_dir().display());
            println!("Recovery directory: {}", paths.recovery_dir().display());
            println!();
            println!("Settings:");
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Some(Commands::Backup(cmd)) => {
            ensure_initialized(&paths)?;
            let service = BackupService::new(paths, settings);
            handle_backup_command(&service, cmd)?;
        }
        Some(Commands::Recovery(cmd)) => {
            ensure_initialized(&paths)?;
            let service = BackupService::new(paths, settings);
            handle_recovery_command(&service, cmd)?;
        }
        Some(Commands::Run) => {
            ensure_initialized(&paths)?;
            settings.validate()?;
            run_scheduler(Arc::new(BackupService::new(paths, settings)))?;
        }
        None => {
            println!("streakvault - backup and recovery for the streak tracker");
            println!();
            println!("Run 'streakvault --help' for usage information.");
        }
    }

    Ok(())
}
