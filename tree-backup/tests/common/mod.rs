// Shared fixtures for the pipeline tests

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tree_backup::config::Config;
use tree_backup::fs::space::FreeSpaceProbe;
use tree_backup::fs::walker::{walk_directory, WalkOptions};
use tree_backup::sync::{MirrorExecutor, SyncOptions, SyncOutcome};

pub const GB: u64 = 1024 * 1024 * 1024;

/// In-process stand-in for `rsync -a --delete src/ dst`
#[derive(Default)]
pub struct LocalMirror {
    pub calls: Cell<usize>,
}

impl MirrorExecutor for &LocalMirror {
    async fn mirror(
        &self,
        source: &Path,
        destination: &Path,
        options: &SyncOptions,
    ) -> tree_backup::Result<SyncOutcome> {
        self.calls.set(self.calls.get() + 1);

        let walk = WalkOptions::with_excludes(&options.exclude);
        let files = walk_directory(source, &walk)?;
        fs::create_dir_all(destination)?;

        let mut keep = HashSet::new();
        for file in &files {
            let target = destination.join(&file.relative_path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&file.path, &target)?;
            keep.insert(file.relative_path.clone());
        }

        if options.delete {
            for existing in walk_directory(destination, &WalkOptions::default())? {
                if !keep.contains(&existing.relative_path) {
                    fs::remove_file(&existing.path)?;
                }
            }
        }

        Ok(SyncOutcome::completed(0, Duration::ZERO))
    }
}

/// Reports a fixed amount of free space
pub struct FixedSpace(pub u64);

/// More room than any test tree needs
pub fn plenty() -> FixedSpace {
    FixedSpace(100 * GB)
}

impl FreeSpaceProbe for FixedSpace {
    fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.0)
    }
}

/// A scratch machine: source trees, a backup disk and a restore target
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn backup_root(&self) -> PathBuf {
        self.path("usb")
    }

    /// Create `home/<name>` with `files` regular files spread over two levels
    pub fn make_source(&self, name: &str, files: usize) -> PathBuf {
        let root = self.path(&format!("home/{}", name));
        fs::create_dir_all(root.join("sub")).unwrap();
        for i in 0..files {
            let rel = if i % 3 == 0 {
                format!("sub/{}-{}.dat", name, i)
            } else {
                format!("{}-{}.dat", name, i)
            };
            fs::write(root.join(rel), format!("{} payload {}", name, i)).unwrap();
        }
        root
    }

    /// Config with one restore table (`TEST DISK`) pointing under `target/`
    pub fn config(&self, sources: &[(&str, PathBuf)]) -> Config {
        let mut text = format!(
            "[backup]\nroot = {:?}\n\n[backup.sources]\n",
            self.backup_root()
        );
        for (name, path) in sources {
            text.push_str(&format!("{} = {:?}\n", name, path));
        }

        text.push_str(&format!(
            "\n[restore]\nspace_check_path = {:?}\n\n[restore.targets.\"TEST DISK\"]\n",
            self.dir.path()
        ));
        for (name, path) in sources {
            let base = path.file_name().unwrap().to_string_lossy();
            text.push_str(&format!(
                "{} = {:?}\n",
                name,
                self.target(&base)
            ));
        }

        text.push_str("\n[verify]\nsample_size = 3\nseed = 7\n");
        text.push_str("\n[retention]\nmin_backup_interval_days = 0\n");
        Config::from_toml_str(&text).unwrap()
    }

    /// Restore destination for the tree with this directory name
    pub fn target(&self, base: &str) -> PathBuf {
        self.path(&format!("target/{}", base))
    }
}

/// Relative path -> contents for every regular file under `root`
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    walk_directory(root, &WalkOptions::default())
        .unwrap()
        .into_iter()
        .map(|f| {
            let content = fs::read(&f.path).unwrap();
            (f.relative_path, content)
        })
        .collect()
}
