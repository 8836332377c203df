//! Backup pipeline: interval gate, space preflight, per-source mirror, history record.

use super::{log_summary, mirror_item, RunReport, RunStatus};
use crate::config::Config;
use crate::fs::space::{FreeSpaceProbe, SpaceChecker};
use crate::history::{format_duration, BackupHistory, BackupRecord, HistoryLedger};
use crate::sync::MirrorExecutor;
use crate::verify::{ChecksumVerifier, ContentHasher};
use crate::{BackupError, Result};
use chrono::Local;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

pub struct BackupOrchestrator<'a, M, H, P> {
    config: &'a Config,
    executor: M,
    verifier: Option<ChecksumVerifier<H>>,
    space: SpaceChecker<P>,
    ledger: HistoryLedger,
    force: bool,
}

impl<'a, M, H, P> BackupOrchestrator<'a, M, H, P>
where
    M: MirrorExecutor,
    H: ContentHasher,
    P: FreeSpaceProbe,
{
    pub fn new(config: &'a Config, executor: M, hasher: H, probe: P) -> Self {
        let verifier = config.verify.enabled.then(|| {
            ChecksumVerifier::from_config(hasher, &config.verify)
                .with_excludes(&config.sync.options.exclude)
        });

        Self {
            config,
            executor,
            verifier,
            space: SpaceChecker::new(probe),
            ledger: HistoryLedger::new(config.backup.history_file()),
            force: false,
        }
    }

    /// Run even if the minimum interval since the last successful backup has not passed
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Use a pre-built verifier (e.g. with a fixed RNG) instead of the configured one
    pub fn with_verifier(mut self, verifier: Option<ChecksumVerifier<H>>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    /// Execute one backup run.
    ///
    /// Returns `Err` only when the run is aborted before any item is touched
    /// (insufficient space, backup directory cannot be created). Item failures
    /// are reported in the [`RunReport`] and recorded in the history ledger.
    pub async fn run(&mut self) -> Result<RunReport> {
        let start = Instant::now();
        let backup_dir = self.config.backup.backup_dir();
        info!("Starting backup - {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

        if backup_dir.exists() {
            info!("Using existing backup directory: {}", backup_dir.display());
        } else {
            info!("Backup directory will be created: {}", backup_dir.display());
        }

        let history = self.ledger.load();
        if let Some(last) = history.last() {
            info!("Last backup: {} (success: {})", last.backup_time, last.success);
        }

        if self.interval_not_elapsed(&history) {
            return Ok(RunReport::skipped());
        }

        let sources = &self.config.backup.sources;
        let margin_gb = self.config.space.min_free_space_gb;
        let space = self.space.check(
            sources.values().map(PathBuf::as_path),
            &backup_dir,
            margin_gb,
        );
        if !space.ok {
            error!(
                "Insufficient space. Required: {:.2} GB, available: {:.2} GB",
                space.needed_gb + margin_gb,
                space.available_gb
            );
            return Err(BackupError::InsufficientSpace {
                needed_gb: space.needed_gb + margin_gb,
                margin_gb,
                available_gb: space.available_gb,
            });
        }

        std::fs::create_dir_all(&backup_dir)?;

        let mut items = Vec::with_capacity(sources.len());
        for (name, source) in sources {
            let destination = self.config.backup.mirror_path(&backup_dir, source);
            info!(
                "Backing up {}: {} -> {}",
                name,
                source.display(),
                destination.display()
            );

            let outcome = mirror_item(
                &self.executor,
                self.verifier.as_mut(),
                &self.config.sync.options,
                name,
                source,
                &destination,
            )
            .await;
            items.push(outcome);
        }

        let report = RunReport::from_items(items, space.needed_gb, start.elapsed());
        let success = report.status == RunStatus::Succeeded;

        if success {
            info!("Backup completed in {}", format_duration(report.elapsed));
        }
        log_summary("Backup", &report);

        self.ledger.append(BackupRecord::new(
            Local::now(),
            success,
            report.needed_gb,
            report.elapsed,
            sources,
        ));

        Ok(report)
    }

    fn interval_not_elapsed(&self, history: &BackupHistory) -> bool {
        let days = self.config.retention.min_backup_interval_days;
        if self.force || days == 0 {
            return false;
        }

        let Some(last) = history.last_successful() else {
            return false;
        };
        let Some(last_time) = last.backup_time_local() else {
            return false;
        };

        let age = Local::now().signed_duration_since(last_time);
        if age < chrono::Duration::days(i64::from(days)) {
            info!(
                "Last successful backup at {} is less than {} day(s) old, \
                 skipping (use --force to override)",
                last.backup_time, days
            );
            return true;
        }
        false
    }
}
