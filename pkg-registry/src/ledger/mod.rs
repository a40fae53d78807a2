//! # Metadata Ledger
//!
//! One descriptive record per package, kept as an index over the
//! [`store`](crate::store). Backends only provide keyed `read`/`write`/
//! `delete`; the read-modify-write rules live in the provided methods and in
//! [`PackageRecord`].

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use crate::error::{RegistryError, RegistryResult};

pub mod json;
pub mod memory;
pub mod record;

pub use self::json::JsonFileLedger;
pub use self::memory::MemoryLedger;
pub use self::record::{DeletionEffect, FileRecord, PackageRecord, UploadDetails, VersionRecord};

/// Result of folding a deletion into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerDeletion {
    /// The record still has versions and was saved.
    Updated(PackageRecord),
    /// The last version went away and the record was deleted.
    PackageRemoved,
    /// There was no record to update.
    Missing,
}

#[async_trait]
pub trait MetadataLedger: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &'static str;

    /// Raw stored record, `None` when absent.
    async fn read(&self, package: &str) -> RegistryResult<Option<PackageRecord>>;

    /// Persist a record, replacing any previous one atomically.
    async fn write(&self, record: &PackageRecord) -> RegistryResult<()>;

    /// Delete a record. Returns whether one existed.
    async fn delete(&self, package: &str) -> RegistryResult<bool>;

    /// Record for `package`, or an empty default. An unreadable record is
    /// reported and treated as absent so it gets rebuilt on the next write.
    async fn load(&self, package: &str) -> RegistryResult<PackageRecord> {
        match self.read(package).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Ok(PackageRecord::empty(package)),
            Err(RegistryError::Json(e)) => {
                let inconsistency = RegistryError::CascadeInconsistency(format!(
                    "unreadable metadata record: {e}"
                ));
                warn!(
                    package = %package,
                    ledger = self.name(),
                    error = %inconsistency,
                    "Discarding metadata record"
                );
                Ok(PackageRecord::empty(package))
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_upload(
        &self,
        package: &str,
        upload: &UploadDetails,
    ) -> RegistryResult<PackageRecord> {
        let mut record = self.load(package).await?;
        record.apply_upload(upload, Utc::now());
        self.write(&record).await?;
        Ok(record)
    }

    async fn apply_deletion(
        &self,
        package: &str,
        version: &str,
        filename: &str,
    ) -> RegistryResult<LedgerDeletion> {
        let Some(mut record) = self.read(package).await.or_else(|e| match e {
            RegistryError::Json(_) => Ok(None),
            other => Err(other),
        })?
        else {
            return Ok(LedgerDeletion::Missing);
        };

        let effect = record.apply_deletion(version, filename);
        if !effect.file_removed {
            warn!(
                package = %package,
                version = %version,
                file = %filename,
                "Deleted file had no metadata entry"
            );
        }

        if effect.package_removed {
            self.delete(package).await?;
            return Ok(LedgerDeletion::PackageRemoved);
        }

        if effect.file_removed {
            self.write(&record).await?;
        }
        Ok(LedgerDeletion::Updated(record))
    }
}
