//! Sampling verification of a mirrored tree.
//!
//! A bounded random subset of the source's regular files is hash-compared
//! with the same relative paths under the destination. This is a pass/fail
//! gate only; nothing is re-copied.

pub mod hasher;

pub use hasher::{ContentHasher, Sha256Hasher};

use crate::config::VerifyConfig;
use crate::fs::walker::{walk_directory, FileInfo, WalkOptions};
use crate::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};

/// First problem found while checking a sample
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    #[error("missing at destination: {}", .0.display())]
    MissingAtDestination(PathBuf),

    #[error("cannot hash {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error(
        "checksum mismatch: {} (source {source_digest}, destination {destination_digest})",
        .relative_path.display()
    )]
    Mismatch {
        relative_path: PathBuf,
        source_digest: String,
        destination_digest: String,
    },
}

#[derive(Debug, Clone)]
pub struct VerificationReport {
    /// Regular files found under the source
    pub total_files: usize,
    /// Relative paths hashed on both sides, in check order
    pub checked: Vec<PathBuf>,
    pub failure: Option<VerifyFailure>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct ChecksumVerifier<H> {
    hasher: H,
    sample_size: usize,
    walk_options: WalkOptions,
    rng: StdRng,
}

impl<H: ContentHasher> ChecksumVerifier<H> {
    pub fn new(hasher: H, sample_size: usize, rng: StdRng) -> Self {
        Self {
            hasher,
            sample_size,
            walk_options: WalkOptions::default(),
            rng,
        }
    }

    /// Verifier seeded from `config.seed`, or from entropy when unset
    pub fn from_config(hasher: H, config: &VerifyConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(hasher, config.sample_size, rng)
    }

    /// Skip files the mirroring tool excludes; they never reach the destination
    pub fn with_excludes(mut self, patterns: &[String]) -> Self {
        self.walk_options = WalkOptions::with_excludes(patterns);
        self
    }

    /// Pick at most `sample_size` files uniformly without replacement.
    ///
    /// The result keeps the input's relative order.
    pub fn sample(&mut self, files: Vec<FileInfo>) -> Vec<FileInfo> {
        if files.len() <= self.sample_size {
            return files;
        }

        let mut picked = rand::seq::index::sample(&mut self.rng, files.len(), self.sample_size)
            .into_vec();
        picked.sort_unstable();

        let mut slots: Vec<Option<FileInfo>> = files.into_iter().map(Some).collect();
        picked
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect()
    }

    /// Compare a sample of `source_dir` with `dest_dir`.
    ///
    /// Errors only when `source_dir` cannot be walked; content problems are
    /// reported through [`VerificationReport::failure`].
    pub fn verify(&mut self, source_dir: &Path, dest_dir: &Path) -> Result<VerificationReport> {
        let files = walk_directory(source_dir, &self.walk_options)?;
        let total_files = files.len();
        let sampled = self.sample(files);

        info!(
            "Verifying {} of {} files: {} -> {}",
            sampled.len(),
            total_files,
            source_dir.display(),
            dest_dir.display()
        );

        let mut checked = Vec::with_capacity(sampled.len());
        for file in sampled {
            let destination = dest_dir.join(&file.relative_path);
            checked.push(file.relative_path.clone());

            if let Some(failure) = self.compare(&file, &destination) {
                error!("Verification failed: {}", failure);
                return Ok(VerificationReport {
                    total_files,
                    checked,
                    failure: Some(failure),
                });
            }
        }

        Ok(VerificationReport {
            total_files,
            checked,
            failure: None,
        })
    }

    fn compare(&self, file: &FileInfo, destination: &Path) -> Option<VerifyFailure> {
        if !destination.is_file() {
            return Some(VerifyFailure::MissingAtDestination(destination.to_path_buf()));
        }

        let source_digest = match self.hasher.hash(&file.path) {
            Ok(digest) => digest,
            Err(e) => {
                return Some(VerifyFailure::Unreadable {
                    path: file.path.clone(),
                    reason: e.to_string(),
                })
            }
        };
        let destination_digest = match self.hasher.hash(destination) {
            Ok(digest) => digest,
            Err(e) => {
                return Some(VerifyFailure::Unreadable {
                    path: destination.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };

        if source_digest != destination_digest {
            return Some(VerifyFailure::Mismatch {
                relative_path: file.relative_path.clone(),
                source_digest,
                destination_digest,
            });
        }

        debug!("ok {}", file.relative_path.display());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use std::io;
    use tempfile::TempDir;

    /// Counts hash calls so tests can see how many files were examined
    struct CountingHasher {
        calls: Cell<usize>,
    }

    impl ContentHasher for CountingHasher {
        fn hash(&self, path: &Path) -> io::Result<String> {
            self.calls.set(self.calls.get() + 1);
            Sha256Hasher.hash(path)
        }
    }

    fn make_tree(root: &Path, count: usize) {
        fs::create_dir_all(root.join("nested")).unwrap();
        for i in 0..count {
            let rel = if i % 2 == 0 {
                format!("file{:02}.dat", i)
            } else {
                format!("nested/file{:02}.dat", i)
            };
            fs::write(root.join(rel), format!("content {}", i)).unwrap();
        }
    }

    fn copy_tree(from: &Path, to: &Path) {
        for file in walk_directory(from, &WalkOptions::default()).unwrap() {
            let target = to.join(&file.relative_path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::copy(&file.path, &target).unwrap();
        }
    }

    fn seeded(sample_size: usize, seed: u64) -> ChecksumVerifier<Sha256Hasher> {
        ChecksumVerifier::new(Sha256Hasher, sample_size, StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_small_tree_verifies_everything() {
        let temp_dir = TempDir::new().unwrap();
        let (src, dst) = (temp_dir.path().join("src"), temp_dir.path().join("dst"));
        make_tree(&src, 4);
        copy_tree(&src, &dst);

        let report = seeded(10, 1).verify(&src, &dst).unwrap();
        assert!(report.passed());
        assert_eq!(report.total_files, 4);
        assert_eq!(report.checked.len(), 4);
    }

    #[test]
    fn test_examines_exactly_sample_size() {
        let temp_dir = TempDir::new().unwrap();
        let (src, dst) = (temp_dir.path().join("src"), temp_dir.path().join("dst"));
        make_tree(&src, 25);
        copy_tree(&src, &dst);

        let hasher = CountingHasher { calls: Cell::new(0) };
        let mut verifier = ChecksumVerifier::new(&hasher, 10, StdRng::seed_from_u64(3));
        let report = verifier.verify(&src, &dst).unwrap();

        assert!(report.passed());
        assert_eq!(report.total_files, 25);
        assert_eq!(report.checked.len(), 10);
        assert_eq!(hasher.calls.get(), 20);

        let mut unique = report.checked.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 10, "sampling is without replacement");
    }

    #[test]
    fn test_mismatch_in_sample_fails() {
        let temp_dir = TempDir::new().unwrap();
        let (src, dst) = (temp_dir.path().join("src"), temp_dir.path().join("dst"));
        make_tree(&src, 25);
        copy_tree(&src, &dst);

        let clean = seeded(5, 42).verify(&src, &dst).unwrap();
        let victim = clean.checked[2].clone();
        fs::write(dst.join(&victim), b"corrupted").unwrap();

        let report = seeded(5, 42).verify(&src, &dst).unwrap();
        assert!(matches!(
            report.failure,
            Some(VerifyFailure::Mismatch { ref relative_path, .. }) if *relative_path == victim
        ));
    }

    #[test]
    fn test_mismatch_outside_sample_passes() {
        let temp_dir = TempDir::new().unwrap();
        let (src, dst) = (temp_dir.path().join("src"), temp_dir.path().join("dst"));
        make_tree(&src, 25);
        copy_tree(&src, &dst);

        let clean = seeded(5, 42).verify(&src, &dst).unwrap();
        let outside: Vec<_> = walk_directory(&src, &WalkOptions::default())
            .unwrap()
            .into_iter()
            .map(|f| f.relative_path)
            .filter(|rel| !clean.checked.contains(rel))
            .collect();
        assert_eq!(outside.len(), 20);
        for rel in &outside {
            fs::write(dst.join(rel), b"corrupted").unwrap();
        }

        let report = seeded(5, 42).verify(&src, &dst).unwrap();
        assert!(report.passed());
        assert_eq!(report.checked, clean.checked);
    }

    #[test]
    fn test_missing_destination_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let (src, dst) = (temp_dir.path().join("src"), temp_dir.path().join("dst"));
        make_tree(&src, 3);
        copy_tree(&src, &dst);
        fs::remove_file(dst.join("nested/file01.dat")).unwrap();

        let report = seeded(10, 0).verify(&src, &dst).unwrap();
        assert!(matches!(
            report.failure,
            Some(VerifyFailure::MissingAtDestination(_))
        ));
    }

    #[test]
    fn test_excluded_files_not_sampled() {
        let temp_dir = TempDir::new().unwrap();
        let (src, dst) = (temp_dir.path().join("src"), temp_dir.path().join("dst"));
        make_tree(&src, 3);
        copy_tree(&src, &dst);
        fs::write(src.join("lock"), b"never copied").unwrap();

        let report = seeded(10, 0)
            .with_excludes(&["lock".to_string()])
            .verify(&src, &dst)
            .unwrap();
        assert!(report.passed());
        assert_eq!(report.total_files, 3);
    }

    #[test]
    fn test_excluded_paths_follow_rsync_rules() {
        let cases = [("/lock", "lock"), ("sub/lock", "sub/lock"), ("[0-9].log", "1.log")];

        for (pattern, never_copied) in cases {
            let temp_dir = TempDir::new().unwrap();
            let (src, dst) = (temp_dir.path().join("src"), temp_dir.path().join("dst"));
            fs::create_dir_all(src.join("sub")).unwrap();
            for rel in ["lock", "sub/lock", "1.log", "keep.txt"] {
                fs::write(src.join(rel), rel).unwrap();
            }
            // what rsync --exclude <pattern> leaves at the destination
            copy_tree(&src, &dst);
            fs::remove_file(dst.join(never_copied)).unwrap();

            let report = seeded(100, 0)
                .with_excludes(&[pattern.to_string()])
                .verify(&src, &dst)
                .unwrap();
            assert!(report.passed(), "{}: {:?}", pattern, report.failure);
            assert_eq!(report.total_files, 3, "{}", pattern);
        }
    }

    #[test]
    fn test_missing_source_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = seeded(10, 0).verify(&temp_dir.path().join("nope"), temp_dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_from_config_seed_is_deterministic() {
        let config = VerifyConfig {
            enabled: true,
            sample_size: 3,
            seed: Some(9),
        };
        let files: Vec<FileInfo> = (0..30)
            .map(|i| FileInfo {
                path: PathBuf::from(format!("/src/{}", i)),
                relative_path: PathBuf::from(i.to_string()),
                size: 0,
            })
            .collect();

        let a = ChecksumVerifier::from_config(Sha256Hasher, &config).sample(files.clone());
        let b = ChecksumVerifier::from_config(Sha256Hasher, &config).sample(files);
        let a: Vec<_> = a.into_iter().map(|f| f.path).collect();
        let b: Vec<_> = b.into_iter().map(|f| f.path).collect();
        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
    }
}
