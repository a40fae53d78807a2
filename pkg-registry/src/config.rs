//! # Configuration Management
//!
//! The engine never reads ambient state: a [`RegistryConfig`] is built once
//! (from an optional JSON file, then optional environment overrides applied by
//! the binary) and handed to [`Coordinator::open`](crate::Coordinator::open).
//!
//! ```rust,no_run
//! use pkg_registry::RegistryConfig;
//!
//! let mut config = RegistryConfig::load_or_default("registry.json")?;
//! config.apply_env_overrides();
//! # Ok::<(), pkg_registry::RegistryError>(())
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::RegistryResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Storage locations for artifacts, ledger records and temp files
    pub storage: StorageConfig,
    /// Upload and transfer limits (defaults applied if not specified)
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the `package/version/file` hierarchy
    pub packages_dir: PathBuf,
    /// Directory holding one `<package>.json` record per package
    pub metadata_dir: PathBuf,
    /// Staging area for in-flight uploads
    pub temp_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_upload_size_bytes: u64,
    /// Chunk size for hashing and download streaming
    pub chunk_size_kb: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_upload_size_bytes: crate::validation::MAX_UPLOAD_SIZE,
            chunk_size_kb: 1024,
        }
    }
}

impl RegistryConfig {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> RegistryResult<Self> {
        let config_str = fs::read_to_string(path)?;
        let config = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    /// Load configuration from file with fallback to defaults when the file
    /// does not exist. A file that exists but fails to parse is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> RegistryResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Place all three storage directories under one data directory.
    pub fn with_data_dir<P: AsRef<Path>>(mut self, data_dir: P) -> Self {
        let data_dir = data_dir.as_ref();
        self.storage.packages_dir = data_dir.join("packages");
        self.storage.metadata_dir = data_dir.join("metadata");
        self.storage.temp_dir = data_dir.join("temp");
        self
    }

    /// Apply `PACKAGES_DIR`, `METADATA_DIR`, `TEMP_DIR` and `MAX_UPLOAD_SIZE`
    /// (bytes) from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("PACKAGES_DIR") {
            self.storage.packages_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("METADATA_DIR") {
            self.storage.metadata_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("TEMP_DIR") {
            self.storage.temp_dir = PathBuf::from(dir);
        }
        if let Some(size) = lookup("MAX_UPLOAD_SIZE") {
            match size.trim().parse::<u64>() {
                Ok(size) => self.limits.max_upload_size_bytes = size,
                Err(e) => warn!(value = %size, error = %e, "Ignoring invalid MAX_UPLOAD_SIZE"),
            }
        }
    }

    pub fn max_upload_size_bytes(&self) -> u64 {
        self.limits.max_upload_size_bytes
    }

    /// Chunk size in bytes, never zero.
    pub fn chunk_size_bytes(&self) -> usize {
        self.limits.chunk_size_kb.max(1) * 1024
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        serde_json::from_str(include_str!("../config.json"))
            .expect("Failed to parse embedded config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_embedded_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.storage.packages_dir, PathBuf::from("./data/packages"));
        assert_eq!(config.storage.metadata_dir, PathBuf::from("./data/metadata"));
        assert_eq!(config.storage.temp_dir, PathBuf::from("./data/temp"));
        assert_eq!(config.max_upload_size_bytes(), 104_857_600);
        assert_eq!(config.chunk_size_bytes(), 1024 * 1024);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = RegistryConfig::load_or_default(temp_dir.path().join("missing.json")).unwrap();
        assert_eq!(config.max_upload_size_bytes(), 104_857_600);
    }

    #[test]
    fn test_load_partial_file_uses_default_limits() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        fs::write(
            &path,
            r#"{"storage": {"packages_dir": "/srv/p", "metadata_dir": "/srv/m", "temp_dir": "/srv/t"}}"#,
        )
        .unwrap();

        let config = RegistryConfig::load(&path).unwrap();
        assert_eq!(config.storage.packages_dir, PathBuf::from("/srv/p"));
        assert_eq!(config.limits.chunk_size_kb, 1024);
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        fs::write(&path, "{not json").unwrap();
        assert!(RegistryConfig::load_or_default(&path).is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PACKAGES_DIR", "/var/pkgs"),
            ("TEMP_DIR", "/var/tmp/pkgs"),
            ("MAX_UPLOAD_SIZE", "2048"),
        ]
        .into_iter()
        .collect();

        let mut config = RegistryConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.storage.packages_dir, PathBuf::from("/var/pkgs"));
        assert_eq!(config.storage.metadata_dir, PathBuf::from("./data/metadata"));
        assert_eq!(config.storage.temp_dir, PathBuf::from("/var/tmp/pkgs"));
        assert_eq!(config.max_upload_size_bytes(), 2048);
    }

    #[test]
    fn test_invalid_size_override_ignored() {
        let mut config = RegistryConfig::default();
        config.apply_overrides(|key| (key == "MAX_UPLOAD_SIZE").then(|| "lots".to_string()));
        assert_eq!(config.max_upload_size_bytes(), 104_857_600);
    }

    #[test]
    fn test_with_data_dir() {
        let config = RegistryConfig::default().with_data_dir("/srv/registry");
        assert_eq!(
            config.storage.packages_dir,
            PathBuf::from("/srv/registry/packages")
        );
        assert_eq!(config.storage.temp_dir, PathBuf::from("/srv/registry/temp"));
    }
}
