//! Append-only ledger of backup runs.
//!
//! Serialized as `backup_history.json` in the backup directory:
//!
//! ```json
//! { "backups": [ { "backup_time": "2025-06-28 10:00:00", "success": true,
//!                  "total_size_gb": 12.34, "duration": "0h 3m 12.50s",
//!                  "source_paths": { "firefox": "/home/..." } } ] }
//! ```
//!
//! Read and write failures are logged and never fail a run.

use crate::config::MappingSet;
use crate::{BackupError, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error};

/// `backup_time` layout
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One backup run. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub backup_time: String,
    pub success: bool,
    pub total_size_gb: f64,
    pub duration: String,
    pub source_paths: MappingSet,
}

impl BackupRecord {
    pub fn new(
        finished_at: DateTime<Local>,
        success: bool,
        total_size_gb: f64,
        elapsed: Duration,
        source_paths: &MappingSet,
    ) -> Self {
        Self {
            backup_time: finished_at.format(TIMESTAMP_FORMAT).to_string(),
            success,
            total_size_gb: (total_size_gb * 100.0).round() / 100.0,
            duration: format_duration(elapsed),
            source_paths: source_paths.clone(),
        }
    }

    /// `backup_time` as local time; `None` if the ledger was hand-edited into nonsense
    pub fn backup_time_local(&self) -> Option<DateTime<Local>> {
        let naive = NaiveDateTime::parse_from_str(&self.backup_time, TIMESTAMP_FORMAT).ok()?;
        Local.from_local_datetime(&naive).earliest()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupHistory {
    #[serde(default)]
    pub backups: Vec<BackupRecord>,
}

impl BackupHistory {
    pub fn last(&self) -> Option<&BackupRecord> {
        self.backups.last()
    }

    pub fn last_successful(&self) -> Option<&BackupRecord> {
        self.backups.iter().rev().find(|record| record.success)
    }
}

/// The on-disk ledger. Single writer assumed; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    path: PathBuf,
}

impl HistoryLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current history; empty when the file is absent, unreadable or corrupt
    pub fn load(&self) -> BackupHistory {
        if !self.path.exists() {
            return BackupHistory::default();
        }

        match self.try_load() {
            Ok(history) => history,
            Err(e) => {
                error!("Failed to read backup history {}: {}", self.path.display(), e);
                BackupHistory::default()
            }
        }
    }

    /// Load, append `record`, persist
    pub fn append(&self, record: BackupRecord) {
        let mut history = self.load();
        history.backups.push(record);
        self.persist(&history);
    }

    /// Overwrite the ledger with `history`, creating its directory if needed
    pub fn persist(&self, history: &BackupHistory) {
        if let Err(e) = self.try_persist(history) {
            error!("Failed to save backup history {}: {}", self.path.display(), e);
        }
    }

    fn try_load(&self) -> Result<BackupHistory> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn try_persist(&self, history: &BackupHistory) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            BackupError::Persistence(format!("{} has no parent directory", self.path.display()))
        })?;
        std::fs::create_dir_all(parent)?;

        let json = serde_json::to_string_pretty(history)?;

        // Replace via rename so a crash mid-write leaves the old ledger intact
        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;

        debug!(
            "Saved {} history records to {}",
            history.backups.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// `"<H>h <M>m <S.SS>s"`
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let hours = (total / 3600.0).floor();
    let minutes = ((total % 3600.0) / 60.0).floor();
    let seconds = total % 60.0;
    format!("{}h {}m {:.2}s", hours as u64, minutes as u64, seconds)
}
