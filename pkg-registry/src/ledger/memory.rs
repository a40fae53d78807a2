//! In-process ledger backend, used when metadata does not need to outlive
//! the process.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{MetadataLedger, PackageRecord};
use crate::error::RegistryResult;
use crate::validation::validate_package_name;

#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<String, PackageRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, PackageRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MetadataLedger for MemoryLedger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, package: &str) -> RegistryResult<Option<PackageRecord>> {
        validate_package_name(package)?;
        Ok(self.records().get(package).cloned())
    }

    async fn write(&self, record: &PackageRecord) -> RegistryResult<()> {
        validate_package_name(&record.name)?;
        self.records().insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, package: &str) -> RegistryResult<bool> {
        validate_package_name(package)?;
        Ok(self.records().remove(package).is_some())
    }
}
