//! Free-space preflight.
//!
//! Point-in-time check only: nothing is reserved, so another process can
//! still consume the space between the check and the copy.

use crate::fs::walker::calculate_total_size;
use std::io;
use std::path::Path;
use tracing::{error, info};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Source of "how many bytes can still be written under this path"
pub trait FreeSpaceProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// `statvfs(2)` probe: blocks available to unprivileged users times fragment size
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsProbe;

impl FreeSpaceProbe for StatvfsProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        let probe_path = nearest_existing_ancestor(path);
        let stat = nix::sys::statvfs::statvfs(probe_path).map_err(io::Error::from)?;
        Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
    }
}

/// Result of a space preflight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceReport {
    pub ok: bool,
    pub needed_gb: f64,
    pub available_gb: f64,
    pub margin_gb: f64,
}

/// Computes required vs. available storage and gates execution
pub struct SpaceChecker<P> {
    probe: P,
}

impl<P: FreeSpaceProbe> SpaceChecker<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    /// Compare the total size of `sources` with the free space at `destination`.
    ///
    /// `ok` holds when `available >= needed + margin_gb`.
    pub fn check<'a, I>(&self, sources: I, destination: &Path, margin_gb: f64) -> SpaceReport
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let needed_bytes: u64 = sources.into_iter().map(calculate_total_size).sum();
        let needed_gb = bytes_to_gb(needed_bytes);

        let available_gb = match self.probe.available_bytes(destination) {
            Ok(bytes) => bytes_to_gb(bytes),
            Err(e) => {
                error!("Cannot read free space of {}: {}", destination.display(), e);
                0.0
            }
        };

        info!("Space required: {:.2} GB", needed_gb);
        info!("Space available at {}: {:.2} GB", destination.display(), available_gb);

        SpaceReport {
            ok: available_gb >= needed_gb + margin_gb,
            needed_gb,
            available_gb,
            margin_gb,
        }
    }
}

pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB
}

/// The backup directory may not exist before the first run; probe its parent chain.
fn nearest_existing_ancestor(path: &Path) -> &Path {
    path.ancestors()
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| Path::new("/"))
}
