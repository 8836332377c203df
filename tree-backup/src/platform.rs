//! Host checks run before any pipeline starts.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Model string used when detection fails
pub const UNKNOWN_DISK_MODEL: &str = "Unknown";

const OS_RELEASE: &str = "/etc/os-release";

/// Effective UID is 0
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// `/etc/os-release` names Ubuntu as `ID` or in `ID_LIKE`
pub fn is_ubuntu() -> bool {
    match std::fs::read_to_string(OS_RELEASE) {
        Ok(content) => os_release_is_ubuntu(&content),
        Err(e) => {
            error!("Failed to read {}: {}", OS_RELEASE, e);
            false
        }
    }
}

/// Checks `ID` and `ID_LIKE` (space separated, optionally quoted), case-insensitively
pub fn os_release_is_ubuntu(content: &str) -> bool {
    content.lines().any(|line| {
        let Some((key, value)) = line.trim().split_once('=') else {
            return false;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key.trim() {
            "ID" => value.eq_ignore_ascii_case("ubuntu"),
            "ID_LIKE" => value
                .split_whitespace()
                .any(|id| id.eq_ignore_ascii_case("ubuntu")),
            _ => false,
        }
    })
}

/// Identifies the machine a restore is running on
#[allow(async_fn_in_trait)]
pub trait DiskModelResolver {
    /// Never fails; [`UNKNOWN_DISK_MODEL`] when the model cannot be read
    async fn disk_model(&self) -> String;
}

/// `lsblk -dno MODEL <device>`
#[derive(Debug, Clone)]
pub struct LsblkResolver {
    device: PathBuf,
}

impl LsblkResolver {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl DiskModelResolver for LsblkResolver {
    async fn disk_model(&self) -> String {
        let output = Command::new("lsblk")
            .arg("-dno")
            .arg("MODEL")
            .arg(&self.device)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let model = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if model.is_empty() {
                    warn!("lsblk reported no model for {}", self.device.display());
                    return UNKNOWN_DISK_MODEL.to_string();
                }
                debug!("Disk model of {}: {}", self.device.display(), model);
                model
            }
            Ok(output) => {
                error!(
                    "lsblk failed for {} ({}): {}",
                    self.device.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                UNKNOWN_DISK_MODEL.to_string()
            }
            Err(e) => {
                error!("Failed to run lsblk: {}", e);
                UNKNOWN_DISK_MODEL.to_string()
            }
        }
    }
}

/// A model given on the command line
#[derive(Debug, Clone)]
pub struct FixedDiskModel(pub String);

impl DiskModelResolver for FixedDiskModel {
    async fn disk_model(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ubuntu_id() {
        let content = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\nID_LIKE=debian\n";
        assert!(os_release_is_ubuntu(content));
    }

    #[test]
    fn test_ubuntu_derivative() {
        let content = "NAME=\"Linux Mint\"\nID=linuxmint\nID_LIKE=\"ubuntu debian\"\n";
        assert!(os_release_is_ubuntu(content));
    }

    #[test]
    fn test_not_ubuntu() {
        assert!(!os_release_is_ubuntu("ID=fedora\nVERSION_ID=40\n"));
        assert!(!os_release_is_ubuntu("ID=debian\n"));
        // substring of another key must not count
        assert!(!os_release_is_ubuntu("UBUNTU_CODENAME=jammy\nID=pop\n"));
        assert!(!os_release_is_ubuntu(""));
    }

    #[tokio::test]
    async fn test_fixed_model() {
        let resolver = FixedDiskModel("WDC WD10EZEX".into());
        assert_eq!(resolver.disk_model().await, "WDC WD10EZEX");
    }

    #[tokio::test]
    async fn test_missing_device_is_unknown() {
        let resolver = LsblkResolver::new("/dev/tree-backup-no-such-device");
        assert_eq!(resolver.disk_model().await, UNKNOWN_DISK_MODEL);
    }
}
