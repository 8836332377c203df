//! Mirroring through an external tool: argument building and execution.

pub mod command;
pub mod executor;

pub use command::{SyncCommandBuilder, SyncOptions};
pub use executor::{MirrorExecutor, RsyncExecutor, SyncOutcome};
