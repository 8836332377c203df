//! tree-backup library
//!
//! Mirrors named directory trees to a backup disk with rsync, verifies a
//! random sample of each copy, and restores the trees onto machines
//! identified by their disk model.

pub mod config;
pub mod executor;
pub mod fs;
pub mod history;
pub mod platform;
pub mod sync;
pub mod utils;
pub mod verify;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupOrchestrator, RestoreOrchestrator, RunReport, RunStatus};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
