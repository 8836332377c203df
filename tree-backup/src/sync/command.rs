//! Translation of [`SyncOptions`] into mirroring-tool arguments.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

/// Flags handed to the mirroring tool. Same set for backup and restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// `-a`, archive mode
    pub archive: bool,
    /// `-v`
    pub verbose: bool,
    /// `-z`, compress in transit
    pub compress: bool,
    /// `--delete`, drop destination files missing from the source
    pub delete: bool,
    /// `--info=progress2`
    pub progress: bool,
    /// `--exclude <pattern>` each, in order
    pub exclude: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            archive: true,
            verbose: true,
            compress: true,
            delete: true,
            progress: true,
            exclude: vec!["lock".to_string()],
        }
    }
}

pub struct SyncCommandBuilder;

impl SyncCommandBuilder {
    /// Arguments for mirroring the *contents* of `source` into `destination`.
    ///
    /// The source always ends with exactly one `/`; the destination is passed as given.
    pub fn build(options: &SyncOptions, source: &Path, destination: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();

        if options.archive {
            args.push("-a".into());
        }
        if options.verbose {
            args.push("-v".into());
        }
        if options.compress {
            args.push("-z".into());
        }
        if options.delete {
            args.push("--delete".into());
        }
        if options.progress {
            args.push("--info=progress2".into());
        }

        for pattern in &options.exclude {
            args.push("--exclude".into());
            args.push(pattern.into());
        }

        args.push(contents_of(source));
        args.push(destination.as_os_str().to_os_string());

        args
    }
}

fn contents_of(source: &Path) -> OsString {
    let bytes = source.as_os_str().as_bytes();
    let end = bytes.iter().rposition(|&b| b != b'/').map_or(0, |i| i + 1);
    let mut normalized = bytes[..end].to_vec();
    normalized.push(b'/');
    OsString::from_vec(normalized)
}
