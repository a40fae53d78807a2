//! # Coordinator
//!
//! Composes the [`ArtifactStore`] and the [`MetadataLedger`] into the
//! registry operations. Mutations take the package lock, change the store
//! first and then the ledger, and finish by reconciling the ledger record
//! with what the store actually holds. Reads take existence from the store
//! and descriptive fields from the ledger.

use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::ledger::{
    FileRecord, JsonFileLedger, LedgerDeletion, MetadataLedger, PackageRecord, UploadDetails,
    VersionRecord,
};
use crate::locks::PackageLocks;
use crate::store::{ArtifactStore, ByteStream, FsArtifactStore, StoredFile, StoredVersion};
use crate::types::{
    Download, FileInfo, FileIntegrity, IntegrityReport, IntegrityStatus, MessageResponse,
    PackageSummary, RegistryStatus, UploadRequest, UploadResponse, VersionDetail, VersionSummary,
};
use crate::validation::{
    validate_file_key, validate_package_name, validate_version, ValidationError,
    DEFAULT_UPLOAD_FILENAME,
};

pub const SERVICE_NAME: &str = "Agent Registry";

pub struct Coordinator {
    store: Arc<dyn ArtifactStore>,
    ledger: Arc<dyn MetadataLedger>,
    locks: PackageLocks,
}

impl Coordinator {
    /// Filesystem store and JSON ledger at the configured directories, which
    /// are created if missing.
    pub async fn open(config: &RegistryConfig) -> RegistryResult<Self> {
        let store = FsArtifactStore::from_config(config);
        store.ensure_dirs().await?;
        fs::create_dir_all(&config.storage.metadata_dir).await?;

        info!(
            packages_dir = %config.storage.packages_dir.display(),
            metadata_dir = %config.storage.metadata_dir.display(),
            temp_dir = %config.storage.temp_dir.display(),
            "Opened package registry"
        );

        let ledger = JsonFileLedger::new(&config.storage.metadata_dir);
        Ok(Self::new(Arc::new(store), Arc::new(ledger)))
    }

    pub fn new(store: Arc<dyn ArtifactStore>, ledger: Arc<dyn MetadataLedger>) -> Self {
        Self {
            store,
            ledger,
            locks: PackageLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<dyn MetadataLedger> {
        &self.ledger
    }

    pub async fn list_packages(&self) -> RegistryResult<Vec<PackageSummary>> {
        let mut packages = Vec::new();
        for name in self.store.list_packages().await? {
            // A package deleted since the listing is skipped.
            let Some(versions) = present(self.store.list_versions(&name).await)? else {
                continue;
            };
            packages.push(self.summarize(&name, &versions).await?);
        }
        Ok(packages)
    }

    pub async fn get_package(&self, name: &str) -> RegistryResult<PackageSummary> {
        validate_package_name(name).inspect_err(rejected)?;
        let versions = self.store.list_versions(name).await?;
        self.summarize(name, &versions).await
    }

    pub async fn list_versions(&self, name: &str) -> RegistryResult<Vec<VersionSummary>> {
        validate_package_name(name).inspect_err(rejected)?;
        let stored = self.store.list_versions(name).await?;
        let record = self.ledger.load(name).await?;

        let mut versions = Vec::with_capacity(stored.len());
        for version in &stored {
            let Some(files) = present(self.store.list_files(name, &version.version).await)? else {
                continue;
            };
            versions.push(VersionSummary {
                version: version.version.clone(),
                files: file_infos(&record, &version.version, files),
                upload_date: upload_date(&record, version),
            });
        }
        Ok(versions)
    }

    pub async fn get_version(&self, name: &str, version: &str) -> RegistryResult<VersionDetail> {
        validate_package_name(name).inspect_err(rejected)?;
        validate_version(version).inspect_err(rejected)?;

        let files = self.store.list_files(name, version).await?;
        let stored = self
            .store
            .list_versions(name)
            .await?
            .into_iter()
            .find(|v| v.version == version)
            .ok_or_else(|| RegistryError::version_not_found(name, version))?;
        let record = self.ledger.load(name).await?;

        Ok(VersionDetail {
            package: name.to_string(),
            version: version.to_string(),
            files: file_infos(&record, version, files),
            upload_date: upload_date(&record, &stored),
        })
    }

    /// Store an upload and record it. An empty `filename` is stored as
    /// [`DEFAULT_UPLOAD_FILENAME`]. The ledger is untouched if ingestion
    /// fails.
    pub async fn upload(
        &self,
        name: &str,
        version: &str,
        filename: &str,
        stream: ByteStream,
        request: UploadRequest,
    ) -> RegistryResult<UploadResponse> {
        let filename = if filename.is_empty() {
            DEFAULT_UPLOAD_FILENAME
        } else {
            filename
        };
        validate_file_key(name, version, filename).inspect_err(rejected)?;

        let _guard = self.locks.acquire(name).await;
        let receipt = self.store.ingest(name, version, filename, stream).await?;

        let upload = UploadDetails {
            version: version.to_string(),
            filename: filename.to_string(),
            size: receipt.size,
            hash: receipt.sha256.clone(),
            description: request.description,
            author: request.author,
            author_email: request.author_email,
        };
        let record = self.ledger.apply_upload(name, &upload).await?;
        self.reconcile(name, record, Scope::Version(version)).await?;

        info!(
            package = %name,
            version = %version,
            file = %filename,
            size = receipt.size,
            hash = %receipt.sha256,
            "Package file uploaded"
        );

        Ok(UploadResponse {
            message: format!("File '{filename}' uploaded successfully"),
            package: name.to_string(),
            version: version.to_string(),
            file: filename.to_string(),
            size: receipt.size,
            hash: receipt.sha256,
        })
    }

    pub async fn download(
        &self,
        name: &str,
        version: &str,
        filename: &str,
    ) -> RegistryResult<Download> {
        validate_file_key(name, version, filename).inspect_err(rejected)?;
        let fetched = self.store.fetch(name, version, filename).await?;
        debug!(
            package = %name,
            version = %version,
            file = %filename,
            size = fetched.size,
            "Serving download"
        );

        Ok(Download {
            filename: filename.to_string(),
            size: fetched.size,
            stream: fetched.stream,
        })
    }

    /// Delete one file. Removing the last file of a version removes the
    /// version, and removing the last version removes the package and its
    /// ledger record.
    pub async fn delete_file(
        &self,
        name: &str,
        version: &str,
        filename: &str,
    ) -> RegistryResult<MessageResponse> {
        validate_file_key(name, version, filename).inspect_err(rejected)?;

        let _guard = self.locks.acquire(name).await;
        let outcome = self.store.remove(name, version, filename).await?;
        let deletion = self.ledger.apply_deletion(name, version, filename).await?;

        match (outcome.package_removed, deletion) {
            (true, LedgerDeletion::PackageRemoved) => {}
            (true, LedgerDeletion::Missing) => {
                // Missing also covers an unreadable record file.
                self.ledger.delete(name).await?;
            }
            (true, LedgerDeletion::Updated(record)) => {
                let inconsistency = RegistryError::CascadeInconsistency(format!(
                    "store removed the package but the ledger still lists {} version(s)",
                    record.versions.len()
                ));
                warn!(package = %name, error = %inconsistency, "Removing stale metadata record");
                self.ledger.delete(name).await?;
            }
            (false, LedgerDeletion::Updated(record)) => {
                self.reconcile(name, record, Scope::Version(version)).await?;
            }
            (false, LedgerDeletion::PackageRemoved | LedgerDeletion::Missing) => {
                let inconsistency = RegistryError::CascadeInconsistency(
                    "ledger has no versions left but the store still holds some".to_string(),
                );
                warn!(package = %name, error = %inconsistency, "Rebuilding metadata record");
                self.reconcile(name, PackageRecord::empty(name), Scope::Package)
                    .await?;
            }
        }

        info!(
            package = %name,
            version = %version,
            file = %filename,
            version_removed = outcome.version_removed,
            package_removed = outcome.package_removed,
            "Package file deleted"
        );

        Ok(MessageResponse::new(format!(
            "File '{filename}' deleted successfully"
        )))
    }

    /// Re-hash every stored file of a package and compare with the ledger.
    pub async fn verify_package(&self, name: &str) -> RegistryResult<IntegrityReport> {
        validate_package_name(name).inspect_err(rejected)?;
        let versions = self.store.list_versions(name).await?;
        let record = self.ledger.load(name).await?;

        let mut files = Vec::new();
        for version in &versions {
            let Some(stored) = present(self.store.list_files(name, &version.version).await)? else {
                continue;
            };
            for file in stored {
                let actual = self.store.digest(name, &version.version, &file.name).await?;
                let expected = record
                    .file(&version.version, &file.name)
                    .map(|f| f.hash.clone())
                    .filter(|hash| !hash.is_empty());
                let status = match &expected {
                    None => IntegrityStatus::Unrecorded,
                    Some(hash) if *hash == actual => IntegrityStatus::Ok,
                    Some(_) => IntegrityStatus::Mismatch,
                };
                if status == IntegrityStatus::Mismatch {
                    warn!(
                        package = %name,
                        version = %version.version,
                        file = %file.name,
                        "Stored file does not match recorded hash"
                    );
                }
                files.push(FileIntegrity {
                    version: version.version.clone(),
                    file: file.name,
                    status,
                    expected,
                    actual,
                });
            }
        }

        let report = IntegrityReport::new(name, files);
        info!(
            package = %name,
            ok = report.ok,
            mismatched = report.mismatched,
            unrecorded = report.unrecorded,
            "Verified package"
        );
        Ok(report)
    }

    pub async fn status(&self) -> RegistryResult<RegistryStatus> {
        let mut status = RegistryStatus {
            status: "running".to_string(),
            service: SERVICE_NAME.to_string(),
            ..Default::default()
        };

        for name in self.store.list_packages().await? {
            let Some(versions) = present(self.store.list_versions(&name).await)? else {
                continue;
            };
            status.package_count += 1;
            for version in versions {
                let Some(files) = present(self.store.list_files(&name, &version.version).await)?
                else {
                    continue;
                };
                status.version_count += 1;
                status.file_count += files.len();
                status.total_bytes += files.iter().map(|f| f.size).sum::<u64>();
            }
        }
        Ok(status)
    }

    async fn summarize(
        &self,
        name: &str,
        versions: &[StoredVersion],
    ) -> RegistryResult<PackageSummary> {
        let mut metadata = self.ledger.load(name).await?;
        metadata
            .versions
            .retain(|version, _| versions.iter().any(|v| v.version == *version));
        for (version, entry) in metadata.versions.iter_mut() {
            let stored = present(self.store.list_files(name, version).await)?.unwrap_or_default();
            entry.files.retain(|file| stored.iter().any(|f| f.name == file.name));
        }
        metadata.reassign_latest();

        Ok(PackageSummary {
            name: name.to_string(),
            versions: versions.iter().map(|v| v.version.clone()).collect(),
            metadata,
        })
    }

    /// Make `record` describe what the store holds for `package`.
    /// Missing versions and files are added (hashes recomputed from content),
    /// entries the store no longer has are dropped, and the record is saved
    /// or deleted if anything changed. With [`Scope::Version`], file lists
    /// are only compared for that version and for versions the record lacks.
    async fn reconcile(
        &self,
        package: &str,
        mut record: PackageRecord,
        scope: Scope<'_>,
    ) -> RegistryResult<PackageRecord> {
        let stored = present(self.store.list_versions(package).await)?.unwrap_or_default();
        let mut drift = Vec::new();

        record.versions.retain(|version, _| {
            let keep = stored.iter().any(|v| v.version == *version);
            if !keep {
                drift.push(format!("version '{version}' is not stored"));
            }
            keep
        });

        for version in &stored {
            if !scope.covers(&version.version) && record.versions.contains_key(&version.version) {
                continue;
            }
            let files = present(self.store.list_files(package, &version.version).await)?
                .unwrap_or_default();
            let entry = record
                .versions
                .entry(version.version.clone())
                .or_insert_with(|| {
                    drift.push(format!("version '{}' had no metadata", version.version));
                    VersionRecord {
                        upload_date: Some(version.modified),
                        files: Vec::new(),
                    }
                });

            entry.files.retain(|file| {
                let keep = files.iter().any(|f| f.name == file.name);
                if !keep {
                    drift.push(format!("file '{}/{}' is not stored", version.version, file.name));
                }
                keep
            });

            for file in &files {
                if entry.files.iter().any(|f| f.name == file.name) {
                    continue;
                }
                let hash = self.store.digest(package, &version.version, &file.name).await?;
                drift.push(format!("file '{}/{}' had no metadata", version.version, file.name));
                entry.files.push(FileRecord {
                    name: file.name.clone(),
                    size: file.size,
                    hash,
                });
            }
        }

        if drift.is_empty() {
            return Ok(record);
        }

        let inconsistency = RegistryError::CascadeInconsistency(drift.join("; "));
        warn!(package = %package, error = %inconsistency, "Reconciling metadata with store");

        record.reassign_latest();
        if record.versions.is_empty() {
            self.ledger.delete(package).await?;
        } else {
            self.ledger.write(&record).await?;
        }
        Ok(record)
    }
}

/// How much of a package [`Coordinator::reconcile`] compares file by file.
#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    Package,
    Version(&'a str),
}

impl Scope<'_> {
    fn covers(&self, version: &str) -> bool {
        match self {
            Scope::Package => true,
            Scope::Version(touched) => *touched == version,
        }
    }
}

/// `Ok(None)` for NotFound, so entities removed mid-listing can be skipped.
fn present<T>(result: RegistryResult<T>) -> RegistryResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn rejected(error: &ValidationError) {
    warn!(field = error.field(), error = %error, "Rejected identifier");
}

fn file_infos(record: &PackageRecord, version: &str, files: Vec<StoredFile>) -> Vec<FileInfo> {
    files
        .into_iter()
        .map(|file| FileInfo {
            hash: record.file(version, &file.name).map(|f| f.hash.clone()),
            name: file.name,
            size: file.size,
            last_modified: file.last_modified,
        })
        .collect()
}

/// Declared upload date from the ledger, else the version container's mtime.
fn upload_date(record: &PackageRecord, version: &StoredVersion) -> chrono::DateTime<chrono::Utc> {
    record
        .version(&version.version)
        .and_then(|v| v.upload_date)
        .unwrap_or(version.modified)
}
