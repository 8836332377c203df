//! Running the external mirroring tool.

use crate::config::SyncConfig;
use crate::sync::command::{SyncCommandBuilder, SyncOptions};
use crate::{BackupError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// How one mirror invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Exit code; `None` when killed by a signal or by the timeout
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub timed_out: bool,
}

impl SyncOutcome {
    pub fn completed(exit_code: i32, duration: Duration) -> Self {
        Self {
            exit_code: Some(exit_code),
            duration,
            timed_out: false,
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Capability that makes `destination` a mirror of the contents of `source`
#[allow(async_fn_in_trait)]
pub trait MirrorExecutor {
    async fn mirror(
        &self,
        source: &Path,
        destination: &Path,
        options: &SyncOptions,
    ) -> Result<SyncOutcome>;
}

/// Shells out to rsync (or a compatible program) and waits for it
#[derive(Debug, Clone)]
pub struct RsyncExecutor {
    program: String,
    timeout: Option<Duration>,
}

impl RsyncExecutor {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.timeout_secs.map(Duration::from_secs),
        )
    }

    /// First line of `<program> --version`, or an error when it cannot run
    pub async fn check_installation(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| BackupError::SyncTool(format!("cannot run {}: {}", self.program, e)))?;

        if output.status.success() {
            let version = String::from_utf8_lossy(&output.stdout);
            Ok(version.lines().next().unwrap_or("unknown version").to_string())
        } else {
            Err(BackupError::SyncTool(format!(
                "{} --version exited with {}",
                self.program, output.status
            )))
        }
    }
}

impl MirrorExecutor for RsyncExecutor {
    async fn mirror(
        &self,
        source: &Path,
        destination: &Path,
        options: &SyncOptions,
    ) -> Result<SyncOutcome> {
        let args = SyncCommandBuilder::build(options, source, destination);
        debug!("Executing {} {:?}", self.program, args);

        // stdout/stderr stay attached to the terminal so progress is visible
        let mut command = Command::new(&self.program);
        command.args(&args).stdin(Stdio::null()).kill_on_drop(true);

        let start = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| BackupError::SyncTool(format!("cannot start {}: {}", self.program, e)))?;

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(
                        "{} did not finish within {}s, killing it",
                        self.program,
                        limit.as_secs()
                    );
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill {}: {}", self.program, e);
                    }
                    return Ok(SyncOutcome {
                        exit_code: None,
                        duration: start.elapsed(),
                        timed_out: true,
                    });
                }
            },
            None => child.wait().await?,
        };

        let duration = start.elapsed();
        debug!(
            "{} finished in {:.2}s with exit code {:?}",
            self.program,
            duration.as_secs_f64(),
            status.code()
        );

        Ok(SyncOutcome {
            exit_code: status.code(),
            duration,
            timed_out: false,
        })
    }
}
