//! Request and response types for the coordinator operations.
//!
//! These serialize to the JSON bodies the registry API returns, so a
//! transport can hand them out unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::PackageRecord;
use crate::store::ByteStream;

/// Optional descriptive fields sent with an upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
}

impl UploadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn author_email(mut self, email: impl Into<String>) -> Self {
        self.author_email = Some(email.into());
        self
    }
}

/// A package with its version names and ledger record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageSummary {
    pub name: String,
    pub versions: Vec<String>,
    pub metadata: PackageRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// Content hash from the ledger, if one was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// One entry of `ListVersions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionSummary {
    pub version: String,
    pub files: Vec<FileInfo>,
    pub upload_date: DateTime<Utc>,
}

/// `GetVersion` result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionDetail {
    pub package: String,
    pub version: String,
    pub files: Vec<FileInfo>,
    pub upload_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub package: String,
    pub version: String,
    pub file: String,
    pub size: u64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An open download: the stored file as a chunked stream.
pub struct Download {
    pub filename: String,
    pub size: u64,
    pub stream: ByteStream,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("filename", &self.filename)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    /// Stored content hashes to the recorded value.
    Ok,
    /// Stored content differs from the recorded hash.
    Mismatch,
    /// The file exists but the ledger has no hash for it.
    Unrecorded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileIntegrity {
    pub version: String,
    pub file: String,
    pub status: IntegrityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    pub actual: String,
}

/// `VerifyPackage` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub package: String,
    pub files: Vec<FileIntegrity>,
    pub ok: usize,
    pub mismatched: usize,
    pub unrecorded: usize,
}

impl IntegrityReport {
    pub fn new(package: &str, files: Vec<FileIntegrity>) -> Self {
        let count = |status| files.iter().filter(|f| f.status == status).count();
        Self {
            package: package.to_string(),
            ok: count(IntegrityStatus::Ok),
            mismatched: count(IntegrityStatus::Mismatch),
            unrecorded: count(IntegrityStatus::Unrecorded),
            files,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.mismatched == 0
    }
}

/// `Status` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStatus {
    pub status: String,
    pub service: String,
    pub package_count: usize,
    pub version_count: usize,
    pub file_count: usize,
    pub total_bytes: u64,
}
