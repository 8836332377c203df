//! Custom error types for tree-backup.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error(
        "Insufficient space: need {needed_gb:.2} GB (incl. {margin_gb} GB margin), \
         available {available_gb:.2} GB"
    )]
    InsufficientSpace {
        needed_gb: f64,
        margin_gb: f64,
        available_gb: f64,
    },

    #[error("Source path does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Sync tool error: {0}")]
    SyncTool(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("History persistence error: {0}")]
    Persistence(String),

    #[error("No backup found at {}", .0.display())]
    NoBackupFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, BackupError>;
