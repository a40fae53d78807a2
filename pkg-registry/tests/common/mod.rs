//! Common test utilities and helpers
//!
//! Shared setup for the integration tests: a registry over a temporary data
//! directory and a few upload streams with controlled failure behaviour.

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use pkg_registry::{ByteStream, Coordinator, RegistryConfig, UploadRequest, UploadResponse};
use tempfile::TempDir;

/// Test registry setup result
pub struct TestSetup {
    pub temp_dir: TempDir,
    pub config: RegistryConfig,
    pub registry: Arc<Coordinator>,
}

impl TestSetup {
    pub fn packages_dir(&self) -> &Path {
        &self.config.storage.packages_dir
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.config.storage.metadata_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.config.storage.temp_dir
    }

    /// Upload an in-memory payload with no descriptive fields.
    pub async fn upload(
        &self,
        name: &str,
        version: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<UploadResponse> {
        let response = self
            .registry
            .upload(name, version, filename, payload(data), UploadRequest::new())
            .await?;
        Ok(response)
    }

    /// Read the stored metadata record straight from disk.
    pub fn metadata_json(&self, name: &str) -> Option<serde_json::Value> {
        let path = self.metadata_dir().join(format!("{name}.json"));
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

/// Creates a registry over fresh temporary directories.
pub async fn create_test_setup() -> Result<TestSetup> {
    create_test_setup_with_limit(None).await
}

pub async fn create_test_setup_with_limit(max_upload_size: Option<u64>) -> Result<TestSetup> {
    let temp_dir = TempDir::new()?;
    let mut config = RegistryConfig::default().with_data_dir(temp_dir.path().join("data"));
    // Small enough that test downloads span several chunks.
    config.limits.chunk_size_kb = 64;
    if let Some(max) = max_upload_size {
        config.limits.max_upload_size_bytes = max;
    }

    let registry = Arc::new(Coordinator::open(&config).await?);
    Ok(TestSetup {
        temp_dir,
        config,
        registry,
    })
}

/// A single-chunk upload stream.
pub fn payload(data: &[u8]) -> ByteStream {
    chunked(data, data.len().max(1))
}

/// An upload stream split into `chunk_size` pieces.
pub fn chunked(data: &[u8], chunk_size: usize) -> ByteStream {
    let chunks: Vec<Bytes> = data
        .chunks(chunk_size)
        .map(Bytes::copy_from_slice)
        .collect();
    pkg_registry::bytes_stream(chunks)
}

/// Yields `data` and then fails, like a client disconnecting mid-upload.
pub fn interrupted(data: &[u8]) -> ByteStream {
    let head = Bytes::copy_from_slice(data);
    stream::iter(vec![
        Ok(head),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
    ])
    .boxed()
}

/// Yields `data` and then never completes.
pub fn stalled(data: &[u8]) -> ByteStream {
    let head = Bytes::copy_from_slice(data);
    stream::iter(vec![Ok(head)])
        .chain(stream::pending())
        .boxed()
}

/// Every file below `dir`, recursively, sorted.
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

/// Every entry (files and directories) below `dir`, sorted.
pub fn entries_under(dir: &Path) -> Vec<PathBuf> {
    let mut entries = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(read) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in read.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path.clone());
            }
            entries.push(path);
        }
    }
    entries.sort();
    entries
}
