//! Backup and restore orchestration.
//!
//! Both directions run the same per-item step: check the source, mirror it,
//! verify a sample. Items are processed one at a time in table order and a
//! failed item never stops the loop. Nothing is rolled back: whatever an
//! item copied before failing stays at the destination.

pub mod backup;
pub mod restore;

pub use backup::BackupOrchestrator;
pub use restore::RestoreOrchestrator;

use crate::sync::{MirrorExecutor, SyncOptions};
use crate::verify::{ChecksumVerifier, ContentHasher};
use crate::BackupError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// What happened to one mapping
#[derive(Debug)]
pub struct ItemOutcome {
    pub name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// `None` when mirrored (and verified, if enabled) successfully
    pub error: Option<BackupError>,
}

impl ItemOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
    /// Not attempted (backup interval not yet elapsed)
    Skipped,
}

/// Aggregate result of a run that got past its preflight checks
#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub items: Vec<ItemOutcome>,
    /// Size of everything that had to be copied
    pub needed_gb: f64,
    pub elapsed: Duration,
}

impl RunReport {
    fn from_items(items: Vec<ItemOutcome>, needed_gb: f64, elapsed: Duration) -> Self {
        let status = if items.iter().all(ItemOutcome::succeeded) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        Self {
            status,
            items,
            needed_gb,
            elapsed,
        }
    }

    fn skipped() -> Self {
        Self {
            status: RunStatus::Skipped,
            items: Vec::new(),
            needed_gb: 0.0,
            elapsed: Duration::ZERO,
        }
    }

    /// Exit-code view: a skipped run is not a failure
    pub fn success(&self) -> bool {
        self.status != RunStatus::Failed
    }

    pub fn failed_items(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(|item| !item.succeeded())
    }
}

/// Mirror `source` into `destination`, then verify a sample of it.
pub(crate) async fn mirror_item<M, H>(
    executor: &M,
    verifier: Option<&mut ChecksumVerifier<H>>,
    options: &SyncOptions,
    name: &str,
    source: &Path,
    destination: &Path,
) -> ItemOutcome
where
    M: MirrorExecutor,
    H: ContentHasher,
{
    let result = mirror_and_verify(executor, verifier, options, source, destination).await;

    if let Err(e) = &result {
        error!(item = %name, "{}", e);
    }

    ItemOutcome {
        name: name.to_string(),
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        error: result.err(),
    }
}

async fn mirror_and_verify<M, H>(
    executor: &M,
    verifier: Option<&mut ChecksumVerifier<H>>,
    options: &SyncOptions,
    source: &Path,
    destination: &Path,
) -> crate::Result<()>
where
    M: MirrorExecutor,
    H: ContentHasher,
{
    if !source.exists() {
        return Err(BackupError::SourceMissing(source.to_path_buf()));
    }

    let outcome = executor.mirror(source, destination, options).await?;
    if outcome.timed_out {
        return Err(BackupError::SyncTool(format!(
            "mirroring {} timed out after {:.0}s",
            source.display(),
            outcome.duration.as_secs_f64()
        )));
    }
    if !outcome.success() {
        return Err(BackupError::SyncTool(match outcome.exit_code {
            Some(code) => format!("mirroring {} exited with code {}", source.display(), code),
            None => format!("mirroring {} was terminated by a signal", source.display()),
        }));
    }

    match verifier {
        Some(verifier) => {
            let report = verifier
                .verify(source, destination)
                .map_err(|e| BackupError::Verification(e.to_string()))?;
            if let Some(failure) = report.failure {
                return Err(BackupError::Verification(failure.to_string()));
            }
            info!(
                "Verified {} of {} files in {}",
                report.checked.len(),
                report.total_files,
                destination.display()
            );
        }
        None => info!("Checksum verification disabled, skipping"),
    }

    Ok(())
}

/// Log the per-item summary and the no-rollback notice for failed runs
pub(crate) fn log_summary(operation: &str, report: &RunReport) {
    for item in report.failed_items() {
        if let Some(e) = &item.error {
            error!(item = %item.name, "{} failed: {}", operation, e);
        }
    }
    if report.status == RunStatus::Failed {
        warn!(
            "{} finished with errors; data already copied for failed items was left in place",
            operation
        );
    }
}
