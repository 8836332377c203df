//! Utility modules for tree-backup.

pub mod errors;
pub mod logger;

pub use errors::{BackupError, Result};
