//! The per-package metadata record and its pure update rules.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One descriptive record per package, persisted as JSON.
///
/// ```json
/// {
///   "name": "my-agent",
///   "latest_version": "1.0.0",
///   "description": "...",
///   "author": "...",
///   "author_email": "...",
///   "last_updated": "2024-01-01T12:00:00Z",
///   "versions": {
///     "1.0.0": {
///       "upload_date": "2024-01-01T12:00:00Z",
///       "files": [{ "name": "my_agent-1.0.0.whl", "size": 1024, "hash": "ab12..." }]
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    #[serde(default)]
    pub latest_version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_email: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Keyed by version string; iteration order is lexicographic.
    #[serde(default)]
    pub versions: BTreeMap<String, VersionRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub upload_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub size: u64,
    pub hash: String,
}

/// Everything the ledger learns from one committed upload.
#[derive(Debug, Clone, Default)]
pub struct UploadDetails {
    pub version: String,
    pub filename: String,
    pub size: u64,
    pub hash: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub author_email: Option<String>,
}

/// What a deletion changed in the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionEffect {
    /// A file entry with the given name existed and was removed.
    pub file_removed: bool,
    /// The version entry was dropped because its file list became empty.
    pub version_removed: bool,
    /// No versions remain; the record should be deleted.
    pub package_removed: bool,
}

impl PackageRecord {
    /// A record with empty descriptive fields.
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            latest_version: String::new(),
            description: String::new(),
            author: String::new(),
            author_email: String::new(),
            last_updated: None,
            versions: BTreeMap::new(),
        }
    }

    pub fn version(&self, version: &str) -> Option<&VersionRecord> {
        self.versions.get(version)
    }

    pub fn file(&self, version: &str, filename: &str) -> Option<&FileRecord> {
        self.version(version)?
            .files
            .iter()
            .find(|file| file.name == filename)
    }

    /// Fold one upload into the record.
    ///
    /// Descriptive fields are only replaced by non-empty values. The uploaded
    /// version always becomes `latest_version`, whatever its ordering.
    pub fn apply_upload(&mut self, upload: &UploadDetails, now: DateTime<Utc>) {
        overwrite_if_present(&mut self.description, upload.description.as_deref());
        overwrite_if_present(&mut self.author, upload.author.as_deref());
        overwrite_if_present(&mut self.author_email, upload.author_email.as_deref());
        self.latest_version = upload.version.clone();
        self.last_updated = Some(now);

        let entry = self.versions.entry(upload.version.clone()).or_default();
        entry.files.retain(|file| file.name != upload.filename);
        entry.files.push(FileRecord {
            name: upload.filename.clone(),
            size: upload.size,
            hash: upload.hash.clone(),
        });
        entry.upload_date = Some(now);
    }

    /// Remove one file entry and cascade into the version entry and
    /// `latest_version`.
    pub fn apply_deletion(&mut self, version: &str, filename: &str) -> DeletionEffect {
        let mut effect = DeletionEffect::default();

        if let Some(entry) = self.versions.get_mut(version) {
            let before = entry.files.len();
            entry.files.retain(|file| file.name != filename);
            effect.file_removed = entry.files.len() != before;

            if entry.files.is_empty() {
                self.versions.remove(version);
                effect.version_removed = true;
            }
        }

        self.reassign_latest();
        effect.package_removed = self.versions.is_empty();
        effect
    }

    /// Point `latest_version` at an existing version: unchanged if it still
    /// exists, else the lexicographically greatest remaining version, else
    /// empty.
    pub fn reassign_latest(&mut self) {
        if self.versions.contains_key(&self.latest_version) {
            return;
        }
        self.latest_version = self
            .versions
            .keys()
            .next_back()
            .cloned()
            .unwrap_or_default();
    }
}

/// Parse an RFC 3339 timestamp, or a timestamp without offset read as UTC
/// (`2024-05-01T12:00:00.123456`).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| value.parse::<NaiveDateTime>().ok().map(|ts| ts.and_utc()))
}

/// Records written without offsets, or with an empty or unparseable
/// timestamp, keep their other fields; the timestamp reads as `None`.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(parse_timestamp))
}

fn overwrite_if_present(field: &mut String, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        *field = value.to_string();
    }
}
