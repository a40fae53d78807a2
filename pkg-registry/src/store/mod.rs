//! # Artifact Store
//!
//! Durable storage of uploaded files under a `package → version → file`
//! hierarchy. The store is the source of truth for what exists; the
//! [`ledger`](crate::ledger) only describes it.
//!
//! Implementations must guarantee that a final file path is either absent or
//! holds a complete artifact, and that removing the last file of a version
//! (then of a package) removes the now-empty containers.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::Serialize;

use crate::error::RegistryResult;

pub mod fs;
pub mod stream;

pub use self::fs::FsArtifactStore;
pub use self::stream::{bytes_stream, file_stream, open_file_stream};

/// Chunked byte stream used for both uploads and downloads.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Size and content hash of a committed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVersion {
    pub version: String,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// An open download.
pub struct FetchedFile {
    pub size: u64,
    pub stream: ByteStream,
}

/// Which containers a removal cascaded into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub version_removed: bool,
    pub package_removed: bool,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stage `stream` in a temporary file, hash it, then move it into
    /// `package/version/filename`, replacing any previous file of that name.
    async fn ingest(
        &self,
        package: &str,
        version: &str,
        filename: &str,
        stream: ByteStream,
    ) -> RegistryResult<IngestReceipt>;

    /// Package names present as containers, sorted.
    async fn list_packages(&self) -> RegistryResult<Vec<String>>;

    /// Versions of a package, sorted by version string.
    async fn list_versions(&self, package: &str) -> RegistryResult<Vec<StoredVersion>>;

    /// Files of a version, sorted by filename.
    async fn list_files(&self, package: &str, version: &str) -> RegistryResult<Vec<StoredFile>>;

    async fn fetch(&self, package: &str, version: &str, filename: &str)
        -> RegistryResult<FetchedFile>;

    /// Delete a file and cascade into empty version and package containers.
    async fn remove(
        &self,
        package: &str,
        version: &str,
        filename: &str,
    ) -> RegistryResult<RemoveOutcome>;

    /// Re-hash a stored file.
    async fn digest(&self, package: &str, version: &str, filename: &str) -> RegistryResult<String>;
}
