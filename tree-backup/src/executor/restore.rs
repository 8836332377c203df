//! Restore pipeline: disk-model lookup, locate backup, space preflight, per-item mirror.
//!
//! The backup directory is the single rolling `backup.root/backup.directory`;
//! there is no search across dated directories.

use super::{log_summary, mirror_item, ItemOutcome, RunReport, RunStatus};
use crate::config::{Config, MappingSet};
use crate::fs::space::{FreeSpaceProbe, SpaceChecker};
use crate::history::format_duration;
use crate::sync::MirrorExecutor;
use crate::verify::{ChecksumVerifier, ContentHasher};
use crate::{BackupError, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

/// One planned copy from the backup to the target machine
struct RestoreItem<'a> {
    name: &'a str,
    /// Mirror inside the backup directory
    backup_source: Option<PathBuf>,
    target: &'a Path,
}

pub struct RestoreOrchestrator<'a, M, H, P> {
    config: &'a Config,
    disk_model: String,
    targets: &'a MappingSet,
    executor: M,
    verifier: Option<ChecksumVerifier<H>>,
    space: SpaceChecker<P>,
}

impl<'a, M, H, P> RestoreOrchestrator<'a, M, H, P>
where
    M: MirrorExecutor,
    H: ContentHasher,
    P: FreeSpaceProbe,
{
    /// Fails with [`BackupError::Config`] when `disk_model` has no restore table.
    /// Nothing on disk is touched in that case.
    pub fn new(
        config: &'a Config,
        disk_model: &str,
        executor: M,
        hasher: H,
        probe: P,
    ) -> Result<Self> {
        let targets = config.restore_targets(disk_model).ok_or_else(|| {
            BackupError::Config(format!(
                "no restore paths configured for disk model {:?}",
                disk_model
            ))
        })?;

        let verifier = config.verify.enabled.then(|| {
            ChecksumVerifier::from_config(hasher, &config.verify)
                .with_excludes(&config.sync.options.exclude)
        });

        Ok(Self {
            config,
            disk_model: disk_model.to_string(),
            targets,
            executor,
            verifier,
            space: SpaceChecker::new(probe),
        })
    }

    /// Use a pre-built verifier instead of the configured one
    pub fn with_verifier(mut self, verifier: Option<ChecksumVerifier<H>>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn disk_model(&self) -> &str {
        &self.disk_model
    }

    /// Execute one restore run. No history record is written.
    ///
    /// Returns `Err` when no backup exists or the target lacks space; item
    /// failures are reported in the [`RunReport`].
    pub async fn run(&mut self) -> Result<RunReport> {
        let start = Instant::now();
        info!(
            "Starting restore for {:?} - {}",
            self.disk_model,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        let backup_dir = self.locate_backup()?;
        info!("Using backup directory: {}", backup_dir.display());

        let plan = self.plan(&backup_dir);

        let margin_gb = self.config.space.min_free_space_gb;
        let space_path = &self.config.restore.space_check_path;
        let space = self.space.check(
            plan.iter().filter_map(|item| item.backup_source.as_deref()),
            space_path,
            margin_gb,
        );
        if !space.ok {
            error!(
                "Insufficient space on target. Required: {:.2} GB, available: {:.2} GB",
                space.needed_gb + margin_gb,
                space.available_gb
            );
            return Err(BackupError::InsufficientSpace {
                needed_gb: space.needed_gb + margin_gb,
                margin_gb,
                available_gb: space.available_gb,
            });
        }

        let mut items = Vec::with_capacity(plan.len());
        for item in &plan {
            let outcome = match &item.backup_source {
                Some(backup_source) => {
                    self.restore_item(item.name, backup_source, item.target).await
                }
                None => {
                    let e = BackupError::Config(format!(
                        "{} has a restore target but no backup source",
                        item.name
                    ));
                    error!(item = %item.name, "{}", e);
                    ItemOutcome {
                        name: item.name.to_string(),
                        source: PathBuf::new(),
                        destination: item.target.to_path_buf(),
                        error: Some(e),
                    }
                }
            };
            items.push(outcome);
        }

        let report = RunReport::from_items(items, space.needed_gb, start.elapsed());
        if report.status == RunStatus::Succeeded {
            info!("Restore completed in {}", format_duration(report.elapsed));
        }
        log_summary("Restore", &report);

        Ok(report)
    }

    fn locate_backup(&self) -> Result<PathBuf> {
        let backup_dir = self.config.backup.backup_dir();
        if backup_dir.is_dir() {
            Ok(backup_dir)
        } else {
            error!("Backup directory does not exist: {}", backup_dir.display());
            Err(BackupError::NoBackupFound(backup_dir))
        }
    }

    /// Restore-table order; each name resolves through the backup source of the same name
    fn plan(&self, backup_dir: &Path) -> Vec<RestoreItem<'a>> {
        let config = self.config;
        self.targets
            .iter()
            .map(|(name, target)| RestoreItem {
                name: name.as_str(),
                backup_source: config
                    .backup
                    .sources
                    .get(name)
                    .map(|source| config.backup.mirror_path(backup_dir, source)),
                target: target.as_path(),
            })
            .collect()
    }

    async fn restore_item(
        &mut self,
        name: &str,
        backup_source: &Path,
        target: &Path,
    ) -> ItemOutcome {
        info!(
            "Restoring {}: {} -> {}",
            name,
            backup_source.display(),
            target.display()
        );

        if backup_source.exists() {
            if let Some(parent) = target.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!(item = %name, "Cannot create {}: {}", parent.display(), e);
                    return ItemOutcome {
                        name: name.to_string(),
                        source: backup_source.to_path_buf(),
                        destination: target.to_path_buf(),
                        error: Some(BackupError::Io(e)),
                    };
                }
            }
        }

        mirror_item(
            &self.executor,
            self.verifier.as_mut(),
            &self.config.sync.options,
            name,
            backup_source,
            target,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{SyncOptions, SyncOutcome};
    use crate::verify::Sha256Hasher;
    use std::io;
    use tempfile::TempDir;

    struct NeverCalled;

    impl MirrorExecutor for NeverCalled {
        async fn mirror(
            &self,
            _source: &Path,
            _destination: &Path,
            _options: &SyncOptions,
        ) -> crate::Result<SyncOutcome> {
            panic!("mirror must not run");
        }
    }

    struct ProbeNeverCalled;

    impl FreeSpaceProbe for ProbeNeverCalled {
        fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
            panic!("space probe must not run");
        }
    }

    fn config(root: &Path) -> Config {
        Config::from_toml_str(&format!(
            r#"
[backup]
root = {root:?}
[backup.sources]
docs = "/home/a/docs"
[restore.targets."KNOWN DISK"]
docs = {target:?}
"#,
            root = root.join("usb"),
            target = root.join("restored/docs"),
        ))
        .unwrap()
    }

    #[test]
    fn test_unknown_disk_model_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path());

        let result = RestoreOrchestrator::new(
            &config,
            "OTHER DISK",
            NeverCalled,
            Sha256Hasher,
            ProbeNeverCalled,
        );
        assert!(matches!(result, Err(BackupError::Config(_))));
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_backup_aborts_before_space_check() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path());

        let mut orchestrator = RestoreOrchestrator::new(
            &config,
            "KNOWN DISK",
            NeverCalled,
            Sha256Hasher,
            ProbeNeverCalled,
        )
        .unwrap();
        assert_eq!(orchestrator.disk_model(), "KNOWN DISK");
        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, BackupError::NoBackupFound(_)));
        assert!(!temp_dir.path().join("restored").exists());
    }

    #[tokio::test]
    async fn test_insufficient_space_aborts() {
        struct Tiny;
        impl FreeSpaceProbe for Tiny {
            fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
                Ok(1024)
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path());
        let mirror = config.backup.backup_dir().join("docs");
        std::fs::create_dir_all(&mirror).unwrap();
        std::fs::write(mirror.join("a.txt"), b"hello").unwrap();

        let mut orchestrator =
            RestoreOrchestrator::new(&config, "KNOWN DISK", NeverCalled, Sha256Hasher, Tiny)
                .unwrap();
        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, BackupError::InsufficientSpace { .. }));
        assert!(!temp_dir.path().join("restored").exists());
    }

    #[tokio::test]
    async fn test_missing_mirror_fails_item_without_creating_parent() {
        struct Plenty;
        impl FreeSpaceProbe for Plenty {
            fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
                Ok(1 << 40)
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path());
        std::fs::create_dir_all(config.backup.backup_dir()).unwrap();

        let mut orchestrator =
            RestoreOrchestrator::new(&config, "KNOWN DISK", NeverCalled, Sha256Hasher, Plenty)
                .unwrap();
        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.status, RunStatus::Failed);
        assert!(matches!(report.items[0].error, Some(BackupError::SourceMissing(_))));
        assert!(!temp_dir.path().join("restored").exists());
    }
}
