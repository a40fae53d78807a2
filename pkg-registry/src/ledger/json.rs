//! JSON-file-per-package ledger: `<metadata_dir>/<package>.json`.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{MetadataLedger, PackageRecord};
use crate::error::RegistryResult;
use crate::validation::{resolve_within, validate_package_name};

#[derive(Debug, Clone)]
pub struct JsonFileLedger {
    dir: PathBuf,
}

impl JsonFileLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, package: &str) -> RegistryResult<PathBuf> {
        validate_package_name(package)?;
        Ok(resolve_within(&self.dir, &[&format!("{package}.json")])?)
    }
}

#[async_trait]
impl MetadataLedger for JsonFileLedger {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn read(&self, package: &str) -> RegistryResult<Option<PackageRecord>> {
        let path = self.record_path(package)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn write(&self, record: &PackageRecord) -> RegistryResult<()> {
        let path = self.record_path(&record.name)?;
        fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(record)?;

        // Sibling temp file so the rename stays on one filesystem.
        let temp_path = tempfile::Builder::new()
            .prefix(".record-")
            .suffix(".json")
            .tempfile_in(&self.dir)?
            .into_temp_path();

        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        temp_path.persist(&path).map_err(|e| e.error)?;
        debug!(package = %record.name, path = %path.display(), "Saved metadata record");
        Ok(())
    }

    async fn delete(&self, package: &str) -> RegistryResult<bool> {
        let path = self.record_path(package)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(package = %package, "Removed metadata record");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
