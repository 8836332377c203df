//! tree-backup - Main entry point
//!
//! Backs up the configured trees to the backup disk, or restores them onto
//! this machine.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tree_backup::config::{Config, DEFAULT_CONFIG_PATH};
use tree_backup::fs::space::StatvfsProbe;
use tree_backup::platform::{self, DiskModelResolver, FixedDiskModel, LsblkResolver};
use tree_backup::sync::RsyncExecutor;
use tree_backup::verify::Sha256Hasher;
use tree_backup::{utils, BackupOrchestrator, RestoreOrchestrator, RunReport, RunStatus};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["backup", "restore"])))]
struct Args {
    /// Mirror the configured sources to the backup disk
    #[arg(short, long)]
    backup: bool,

    /// Restore the backup onto this machine
    #[arg(short, long)]
    restore: bool,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Disk model to restore for (skips lsblk detection)
    #[arg(long, value_name = "MODEL")]
    disk_model: Option<String>,

    /// Back up even if the last successful backup is recent
    #[arg(long)]
    force: bool,

    /// Skip the root and Ubuntu checks
    #[arg(long)]
    skip_system_checks: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<bool> {
    if !args.skip_system_checks {
        if !platform::is_root() {
            eprintln!("Please run as root (e.g. with sudo)");
            return Ok(false);
        }
        if !platform::is_ubuntu() {
            eprintln!("This system is not Ubuntu, exiting");
            return Ok(false);
        }
    }

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!("Starting tree-backup v{}", env!("CARGO_PKG_VERSION"));

    let executor = RsyncExecutor::from_config(&config.sync);
    match executor.check_installation().await {
        Ok(version) => tracing::info!("Using {}", version),
        Err(e) => tracing::warn!("{}", e),
    }

    let disk_model = match &args.disk_model {
        Some(model) => FixedDiskModel(model.clone()).disk_model().await,
        None => {
            LsblkResolver::new(&config.platform.disk_device)
                .disk_model()
                .await
        }
    };
    tracing::info!("Disk model: {}", disk_model);

    let report = if args.backup {
        let mut orchestrator =
            BackupOrchestrator::new(&config, executor, Sha256Hasher, StatvfsProbe)
                .with_force(args.force);
        orchestrator.run().await?
    } else {
        let mut orchestrator =
            RestoreOrchestrator::new(&config, &disk_model, executor, Sha256Hasher, StatvfsProbe)?;
        orchestrator.run().await?
    };

    Ok(finish(args.backup, &report))
}

fn finish(backup: bool, report: &RunReport) -> bool {
    let operation = if backup { "Backup" } else { "Restore" };
    match report.status {
        RunStatus::Succeeded => tracing::info!(
            "{}: all {} item(s) succeeded",
            operation,
            report.items.len()
        ),
        RunStatus::Failed => tracing::error!(
            "{} failed for {} of {} item(s)",
            operation,
            report.failed_items().count(),
            report.items.len()
        ),
        RunStatus::Skipped => tracing::info!("{} skipped", operation),
    }
    report.success()
}
