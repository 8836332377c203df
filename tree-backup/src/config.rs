//! Configuration management for tree-backup.
//!
//! Everything the pipelines need (mapping tables, thresholds, rsync options)
//! is loaded once from a TOML file into an immutable [`Config`] and handed to
//! the orchestrators by reference.

use crate::fs::walker::ExcludeSet;
use crate::sync::command::SyncOptions;
use crate::{BackupError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Ordered `name -> path` table. Order decides processing and log order.
pub type MappingSet = IndexMap<String, PathBuf>;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tree-backup/config.toml";

/// Name of the history ledger inside the backup directory
pub const HISTORY_FILE_NAME: &str = "backup_history.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backup: BackupConfig,

    #[serde(default)]
    pub restore: RestoreConfig,

    #[serde(default)]
    pub space: SpaceConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Top-level directory on the backup disk
    pub root: PathBuf,

    /// Rolling backup directory under `root`
    #[serde(default = "default_backup_directory")]
    pub directory: String,

    /// Source trees on the backed-up machine
    pub sources: MappingSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Path whose filesystem must hold the restored data
    #[serde(default = "default_space_check_path")]
    pub space_check_path: PathBuf,

    /// Restore destinations keyed by disk model, then by mapping name
    #[serde(default)]
    pub targets: IndexMap<String, MappingSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceConfig {
    /// Free space that must remain after the copy (GB)
    #[serde(default = "default_min_free_space_gb")]
    pub min_free_space_gb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Hash-compare sampled files after each mirror step
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Files sampled per mapping
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Fixed RNG seed; entropy when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Mirroring tool to execute
    #[serde(default = "default_sync_program")]
    pub program: String,

    /// Kill the mirroring tool after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub options: SyncOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Skip a backup when the last successful one is younger than this (0 = off)
    #[serde(default = "default_min_backup_interval_days")]
    pub min_backup_interval_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Block device whose model identifies the machine
    #[serde(default = "default_disk_device")]
    pub disk_device: PathBuf,
}

// Default values
fn default_backup_directory() -> String {
    "backup".to_string()
}

fn default_space_check_path() -> PathBuf {
    PathBuf::from("/")
}

fn default_min_free_space_gb() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_sample_size() -> usize {
    10
}

fn default_sync_program() -> String {
    "rsync".to_string()
}

fn default_min_backup_interval_days() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_disk_device() -> PathBuf {
    PathBuf::from("/dev/sda")
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            space_check_path: default_space_check_path(),
            targets: IndexMap::new(),
        }
    }
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            min_free_space_gb: default_min_free_space_gb(),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_size: default_sample_size(),
            seed: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            program: default_sync_program(),
            timeout_secs: None,
            options: SyncOptions::default(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            min_backup_interval_days: default_min_backup_interval_days(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            disk_device: default_disk_device(),
        }
    }
}

impl BackupConfig {
    /// The rolling backup directory: `root/directory`
    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(&self.directory)
    }

    /// Location of the history ledger
    pub fn history_file(&self) -> PathBuf {
        self.backup_dir().join(HISTORY_FILE_NAME)
    }

    /// Where the mirror of `source` lives inside `backup_dir`
    pub fn mirror_path(&self, backup_dir: &Path, source: &Path) -> PathBuf {
        match source.file_name() {
            Some(name) => backup_dir.join(name),
            None => backup_dir.to_path_buf(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Restore table for a disk model, if the machine is known
    pub fn restore_targets(&self, disk_model: &str) -> Option<&MappingSet> {
        self.restore.targets.get(disk_model)
    }

    /// Reject tables the pipelines cannot run against
    pub fn validate(&self) -> Result<()> {
        if self.backup.sources.is_empty() {
            return Err(BackupError::Config("backup.sources is empty".into()));
        }

        if self.backup.directory.is_empty() || self.backup.directory.contains('/') {
            return Err(BackupError::Config(format!(
                "backup.directory must be a single path component, got {:?}",
                self.backup.directory
            )));
        }

        let mut basenames = HashSet::new();
        for (name, source) in &self.backup.sources {
            let Some(base) = source.file_name() else {
                return Err(BackupError::Config(format!(
                    "source {} ({}) has no final path component",
                    name,
                    source.display()
                )));
            };
            if !basenames.insert(base.to_os_string()) {
                return Err(BackupError::Config(format!(
                    "source {} shares its directory name {:?} with another source",
                    name, base
                )));
            }
        }

        let source_names: BTreeSet<&str> =
            self.backup.sources.keys().map(String::as_str).collect();
        for (model, table) in &self.restore.targets {
            let names: BTreeSet<&str> = table.keys().map(String::as_str).collect();
            if names != source_names {
                let missing: Vec<_> = source_names.difference(&names).collect();
                let unknown: Vec<_> = names.difference(&source_names).collect();
                return Err(BackupError::Config(format!(
                    "restore table for {:?} is incomplete (missing: {:?}, unknown: {:?})",
                    model, missing, unknown
                )));
            }
        }

        if !self.space.min_free_space_gb.is_finite() || self.space.min_free_space_gb < 0.0 {
            return Err(BackupError::Config(
                "space.min_free_space_gb must be a non-negative number".into(),
            ));
        }

        if let Err(e) = ExcludeSet::new(&self.sync.options.exclude) {
            return Err(BackupError::Config(format!(
                "invalid sync.options.exclude pattern: {}",
                e
            )));
        }

        if self.verify.enabled && self.verify.sample_size == 0 {
            return Err(BackupError::Config(
                "verify.sample_size must be at least 1 when verification is enabled".into(),
            ));
        }

        Ok(())
    }
}
