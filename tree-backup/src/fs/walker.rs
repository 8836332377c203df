//! Directory traversal for size accounting and verification sampling.
//!
//! Only regular files are reported. Symlinks are not followed by default,
//! matching how `rsync -a` copies them as links.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Entries pruned from the walk
    pub excludes: ExcludeSet,
}

impl WalkOptions {
    /// Walk that skips everything the mirroring tool was told to exclude
    pub fn with_excludes(patterns: &[String]) -> Self {
        Self {
            follow_links: false,
            excludes: ExcludeSet::lossy(patterns),
        }
    }
}

/// rsync `--exclude` patterns compiled to glob sets.
///
/// - `/pat` is anchored at the transfer root
/// - `a/pat` (any other `/`) matches the tail of the relative path
/// - `pat` matches a single path component at any depth
/// - a trailing `/` restricts the pattern to directories
///
/// `*` and `?` never cross a `/`; `**` does.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    any: GlobSet,
    dirs_only: GlobSet,
}

impl Default for ExcludeSet {
    fn default() -> Self {
        Self {
            any: GlobSet::empty(),
            dirs_only: GlobSet::empty(),
        }
    }
}

impl ExcludeSet {
    /// Compile `patterns`, failing on the first invalid one
    pub fn new(patterns: &[String]) -> Result<Self, globset::Error> {
        let mut any = GlobSetBuilder::new();
        let mut dirs_only = GlobSetBuilder::new();

        for pattern in patterns {
            if let Some((glob, dir_only)) = translate(pattern) {
                let glob = GlobBuilder::new(&glob).literal_separator(true).build()?;
                if dir_only {
                    dirs_only.add(glob);
                } else {
                    any.add(glob);
                }
            }
        }

        Ok(Self {
            any: any.build()?,
            dirs_only: dirs_only.build()?,
        })
    }

    /// Like [`ExcludeSet::new`], but invalid patterns are logged and skipped
    pub fn lossy(patterns: &[String]) -> Self {
        let valid: Vec<String> = patterns
            .iter()
            .filter(|pattern| match Self::new(std::slice::from_ref(*pattern)) {
                Ok(_) => true,
                Err(e) => {
                    warn!("Ignoring exclude pattern {:?}: {}", pattern, e);
                    false
                }
            })
            .cloned()
            .collect();

        Self::new(&valid).unwrap_or_else(|e| {
            warn!("Cannot compile exclude patterns: {}", e);
            Self::default()
        })
    }

    /// `relative` is the entry's path below the walk root
    pub fn is_excluded(&self, relative: &Path, is_dir: bool) -> bool {
        self.any.is_match(relative) || (is_dir && self.dirs_only.is_match(relative))
    }
}

/// rsync pattern -> (glob over the relative path, directories only)
fn translate(pattern: &str) -> Option<(String, bool)> {
    let dir_only = pattern.ends_with('/');
    let trimmed = pattern.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let glob = match trimmed.strip_prefix('/') {
        Some(anchored) if anchored.is_empty() => return None,
        Some(anchored) => anchored.to_string(),
        None => format!("**/{}", trimmed),
    };
    Some((glob, dir_only))
}

/// A regular file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

impl FileInfo {
    fn from_entry(entry: &DirEntry, root: &Path) -> io::Result<Self> {
        let metadata = entry.metadata().map_err(io::Error::from)?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        Ok(Self {
            path,
            relative_path,
            size: metadata.len(),
        })
    }
}

/// Walk a directory tree and collect all regular files, sorted by relative path.
///
/// Fails only when `root` itself cannot be read; unreadable entries below it
/// are logged and skipped.
pub fn walk_directory(root: &Path, options: &WalkOptions) -> io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    walk_directory_with_callback(root, options, |file| files.push(file.clone()))?;

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

/// Walk a directory tree with a callback for each regular file
pub fn walk_directory_with_callback<F>(
    root: &Path,
    options: &WalkOptions,
    mut callback: F,
) -> io::Result<()>
where
    F: FnMut(&FileInfo),
{
    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !options.excludes.is_excluded(
                    entry.path().strip_prefix(root).unwrap_or(entry.path()),
                    entry.file_type().is_dir(),
                )
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(io::Error::from(e)),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        match FileInfo::from_entry(&entry, root) {
            Ok(file_info) => callback(&file_info),
            Err(e) => warn!("Cannot stat {}: {}", entry.path().display(), e),
        }
    }

    Ok(())
}

/// Total size in bytes of all regular files under `root`.
///
/// Never fails: a missing root counts as empty and per-file stat failures are
/// logged and skipped.
pub fn calculate_total_size(root: &Path) -> u64 {
    let mut total_size = 0u64;

    if let Err(e) = walk_directory_with_callback(root, &WalkOptions::default(), |file| {
        total_size += file.size;
    }) {
        warn!("Cannot compute size of {}: {}", root.display(), e);
    }

    total_size
}
