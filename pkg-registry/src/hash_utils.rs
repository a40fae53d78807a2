//! Cryptographic hashing utilities for package integrity verification

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// Calculate SHA256 hash of data as lowercase hex.
///
/// ```
/// # use pkg_registry::hash_utils::sha256_hash;
/// let hash = sha256_hash(b"hello world");
/// assert_eq!(hash.len(), 64);
/// ```
pub fn sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Incremental SHA256 over a stream of chunks, tracking the byte count.
#[derive(Default)]
pub struct StreamingHasher {
    hasher: Sha256,
    size: u64,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns `(size, sha256_hex)`.
    pub fn finish(self) -> (u64, String) {
        (self.size, format!("{:x}", self.hasher.finalize()))
    }
}

/// Hash a file on disk in `chunk_size` reads. Returns `(size, sha256_hex)`.
pub async fn sha256_file<P: AsRef<Path>>(
    path: P,
    chunk_size: usize,
) -> std::io::Result<(u64, String)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut hasher = StreamingHasher::new();

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finish())
}
