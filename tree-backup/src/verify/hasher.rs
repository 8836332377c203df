//! Content hashing for integrity checks.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Capability that turns a file's content into a comparable digest
pub trait ContentHasher {
    fn hash(&self, path: &Path) -> io::Result<String>;
}

/// Streaming SHA-256, hex encoded
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn hash(&self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }
}

impl<H: ContentHasher + ?Sized> ContentHasher for &H {
    fn hash(&self, path: &Path) -> io::Result<String> {
        (**self).hash(path)
    }
}
