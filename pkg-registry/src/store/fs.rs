//! Filesystem-backed [`ArtifactStore`].
//!
//! Layout: `<root>/<package>/<version>/<filename>`. Uploads are staged under
//! `<temp_dir>` and renamed into place; dot-prefixed entries are staging
//! artifacts and never listed.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{
    file_stream, ArtifactStore, ByteStream, FetchedFile, IngestReceipt, RemoveOutcome, StoredFile,
    StoredVersion,
};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::hash_utils::{sha256_file, StreamingHasher};
use crate::validation::{
    check_upload_size, resolve_within, validate_file_key, validate_package_name, validate_version,
    MAX_UPLOAD_SIZE,
};

const TEMP_PREFIX: &str = ".upload-";
const PARTIAL_PREFIX: &str = ".partial-";
const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
    temp_dir: PathBuf,
    max_upload_size: u64,
    chunk_size: usize,
}

/// Containers created by one ingest, innermost first. Dropping the guard
/// without calling [`ContainerGuard::keep`] removes them again if they are
/// still empty, which covers both failed commits and cancelled uploads.
#[derive(Debug, Default)]
struct ContainerGuard {
    created: Vec<PathBuf>,
}

impl ContainerGuard {
    fn keep(mut self) {
        self.created.clear();
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        for dir in &self.created {
            match std::fs::remove_dir(dir) {
                Ok(()) => debug!(path = %dir.display(), "Removed container left by failed upload"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => debug!(path = %dir.display(), error = %e, "Container kept"),
            }
        }
    }
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            temp_dir: temp_dir.into(),
            max_upload_size: MAX_UPLOAD_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(&config.storage.packages_dir, &config.storage.temp_dir)
            .with_max_upload_size(config.max_upload_size_bytes())
            .with_chunk_size(config.chunk_size_bytes())
    }

    pub fn with_max_upload_size(mut self, bytes: u64) -> Self {
        self.max_upload_size = bytes;
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Create the store root and the staging directory.
    pub async fn ensure_dirs(&self) -> RegistryResult<()> {
        fs::create_dir_all(&self.root).await?;
        fs::create_dir_all(&self.temp_dir).await?;
        Ok(())
    }

    fn package_dir(&self, package: &str) -> RegistryResult<PathBuf> {
        validate_package_name(package)?;
        Ok(resolve_within(&self.root, &[package])?)
    }

    fn version_dir(&self, package: &str, version: &str) -> RegistryResult<PathBuf> {
        validate_package_name(package)?;
        validate_version(version)?;
        Ok(resolve_within(&self.root, &[package, version])?)
    }

    fn file_path(&self, package: &str, version: &str, filename: &str) -> RegistryResult<PathBuf> {
        validate_file_key(package, version, filename)?;
        Ok(resolve_within(&self.root, &[package, version, filename])?)
    }

    /// Write the stream into a fresh temp file, hashing as it goes. The temp
    /// file is deleted on every error path, and on drop if this future is
    /// cancelled.
    async fn stage(&self, mut stream: ByteStream) -> RegistryResult<(TempPath, IngestReceipt)> {
        fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(ingest_error("create staging directory"))?;

        let temp_path = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&self.temp_dir)
            .map_err(ingest_error("create temp file"))?
            .into_temp_path();

        match self.write_stream(&temp_path, &mut stream).await {
            Ok(receipt) => Ok((temp_path, receipt)),
            Err(e) => {
                discard(temp_path);
                Err(e)
            }
        }
    }

    async fn write_stream(
        &self,
        path: &Path,
        stream: &mut ByteStream,
    ) -> RegistryResult<IngestReceipt> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(ingest_error("open temp file"))?;
        let mut hasher = StreamingHasher::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(ingest_error("upload stream interrupted"))?;
            check_upload_size(hasher.size() + chunk.len() as u64, self.max_upload_size)?;
            file.write_all(&chunk)
                .await
                .map_err(ingest_error("write temp file"))?;
            hasher.update(&chunk);
        }

        file.flush().await.map_err(ingest_error("flush temp file"))?;
        file.sync_all()
            .await
            .map_err(ingest_error("sync temp file"))?;

        let (size, sha256) = hasher.finish();
        Ok(IngestReceipt { size, sha256 })
    }

    async fn create_containers(
        &self,
        package_dir: &Path,
        version_dir: &Path,
    ) -> RegistryResult<ContainerGuard> {
        let mut guard = ContainerGuard::default();
        if !is_dir(version_dir).await {
            guard.created.push(version_dir.to_path_buf());
        }
        if !is_dir(package_dir).await {
            guard.created.push(package_dir.to_path_buf());
        }

        fs::create_dir_all(version_dir)
            .await
            .map_err(ingest_error("create version directory"))?;

        if !guard.created.is_empty() {
            debug!(path = %version_dir.display(), "Created version directory");
        }
        Ok(guard)
    }

    /// Move the staged file to its final path. Falls back to copying beside
    /// the target when the staging area is on another filesystem.
    async fn commit(&self, staged: TempPath, final_path: &Path) -> RegistryResult<()> {
        match staged.persist(final_path) {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(error = %e.error, "Rename from staging area failed, copying beside target");
                let staged = e.path;
                let result = copy_beside(&staged, final_path).await;
                discard(staged);
                result
            }
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn ingest(
        &self,
        package: &str,
        version: &str,
        filename: &str,
        stream: ByteStream,
    ) -> RegistryResult<IngestReceipt> {
        let final_path = self.file_path(package, version, filename)?;
        let version_dir = self.version_dir(package, version)?;
        let package_dir = self.package_dir(package)?;

        let (staged, receipt) = self.stage(stream).await?;
        debug!(
            package = %package,
            version = %version,
            filename = %filename,
            size = receipt.size,
            "Upload staged"
        );

        let containers = match self.create_containers(&package_dir, &version_dir).await {
            Ok(containers) => containers,
            Err(e) => {
                discard(staged);
                return Err(e);
            }
        };

        self.commit(staged, &final_path).await?;
        containers.keep();

        info!(
            package = %package,
            version = %version,
            filename = %filename,
            size = receipt.size,
            sha256 = %receipt.sha256,
            "File stored successfully"
        );
        Ok(receipt)
    }

    async fn list_packages(&self) -> RegistryResult<Vec<String>> {
        match read_entries(&self.root, EntryKind::Dir).await {
            Ok(entries) => Ok(entries.into_iter().map(|(name, _)| name).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "Store root does not exist");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_versions(&self, package: &str) -> RegistryResult<Vec<StoredVersion>> {
        let package_dir = self.package_dir(package)?;
        if !is_dir(&package_dir).await {
            return Err(RegistryError::package_not_found(package));
        }

        let entries = read_entries(&package_dir, EntryKind::Dir)
            .await
            .map_err(|e| not_found_or(e, || RegistryError::package_not_found(package)))?;

        Ok(entries
            .into_iter()
            .map(|(version, metadata)| StoredVersion {
                version,
                modified: modified_time(&metadata),
            })
            .collect())
    }

    async fn list_files(&self, package: &str, version: &str) -> RegistryResult<Vec<StoredFile>> {
        let version_dir = self.version_dir(package, version)?;
        if !is_dir(&version_dir).await {
            return Err(RegistryError::version_not_found(package, version));
        }

        let entries = read_entries(&version_dir, EntryKind::File)
            .await
            .map_err(|e| not_found_or(e, || RegistryError::version_not_found(package, version)))?;

        Ok(entries
            .into_iter()
            .map(|(name, metadata)| StoredFile {
                name,
                size: metadata.len(),
                last_modified: modified_time(&metadata),
            })
            .collect())
    }

    async fn fetch(
        &self,
        package: &str,
        version: &str,
        filename: &str,
    ) -> RegistryResult<FetchedFile> {
        let path = self.file_path(package, version, filename)?;
        let not_found = || RegistryError::file_not_found(package, version, filename);

        let file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or(e, not_found))?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        debug!(path = %path.display(), size = metadata.len(), "Serving stored file");
        Ok(FetchedFile {
            size: metadata.len(),
            stream: file_stream(file, self.chunk_size),
        })
    }

    async fn remove(
        &self,
        package: &str,
        version: &str,
        filename: &str,
    ) -> RegistryResult<RemoveOutcome> {
        let path = self.file_path(package, version, filename)?;
        let version_dir = self.version_dir(package, version)?;
        let package_dir = self.package_dir(package)?;
        let not_found = || RegistryError::file_not_found(package, version, filename);

        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| not_found_or(e, not_found))?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or(e, not_found))?;
        info!(package = %package, version = %version, filename = %filename, "File removed");

        let mut outcome = RemoveOutcome::default();
        if remove_if_empty(&version_dir).await {
            outcome.version_removed = true;
            outcome.package_removed = remove_if_empty(&package_dir).await;
        }
        Ok(outcome)
    }

    async fn digest(&self, package: &str, version: &str, filename: &str) -> RegistryResult<String> {
        let path = self.file_path(package, version, filename)?;
        if !is_file(&path).await {
            return Err(RegistryError::file_not_found(package, version, filename));
        }

        let (_, sha256) = sha256_file(&path, self.chunk_size).await?;
        Ok(sha256)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
}

/// Visible entries of `dir` of the requested kind, sorted by name. Entries
/// that vanish mid-listing are skipped.
async fn read_entries(
    dir: &Path,
    kind: EntryKind,
) -> io::Result<Vec<(String, std::fs::Metadata)>> {
    let mut found = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        let keep = match kind {
            EntryKind::Dir => metadata.is_dir(),
            EntryKind::File => metadata.is_file(),
        };
        if keep {
            found.push((name, metadata));
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

async fn copy_beside(source: &Path, final_path: &Path) -> RegistryResult<()> {
    let parent = final_path
        .parent()
        .ok_or_else(|| RegistryError::IngestFailure("target has no parent directory".into()))?;

    let partial = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(parent)
        .map_err(ingest_error("create partial file"))?
        .into_temp_path();

    fs::copy(source, &partial)
        .await
        .map_err(ingest_error("copy staged upload"))?;
    fs::OpenOptions::new()
        .write(true)
        .open(&partial)
        .await
        .map_err(ingest_error("open partial file"))?
        .sync_all()
        .await
        .map_err(ingest_error("sync partial file"))?;

    partial
        .persist(final_path)
        .map_err(|e| RegistryError::IngestFailure(format!("commit upload: {}", e.error)))
}

fn ingest_error(context: &'static str) -> impl FnOnce(io::Error) -> RegistryError {
    move |e| RegistryError::IngestFailure(format!("{context}: {e}"))
}

fn not_found_or<F>(e: io::Error, not_found: F) -> RegistryError
where
    F: FnOnce() -> RegistryError,
{
    if e.kind() == io::ErrorKind::NotFound {
        not_found()
    } else {
        e.into()
    }
}

fn discard(temp_path: TempPath) {
    let path = temp_path.to_path_buf();
    if let Err(e) = temp_path.close() {
        warn!(path = %path.display(), error = %e, "Failed to remove temporary file");
    }
}

/// Remove `path` if it is an empty directory. Failures are logged, not
/// returned.
async fn remove_if_empty(path: &Path) -> bool {
    match is_empty_dir(path).await {
        Ok(true) => match fs::remove_dir(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed empty directory");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove empty directory");
                false
            }
        },
        Ok(false) => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to inspect directory");
            false
        }
    }
}

async fn is_empty_dir(path: &Path) -> io::Result<bool> {
    let mut entries = fs::read_dir(path).await?;
    Ok(entries.next_entry().await?.is_none())
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

fn modified_time(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}
