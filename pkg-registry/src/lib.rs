//! # Package Registry Engine
//!
//! Storage and metadata consistency for a registry of versioned, named
//! artifacts. Files live on the filesystem under `package/version/filename`;
//! each package has one JSON metadata record derived from what is stored.
//!
//! ## Features
//!
//! - **Atomic ingestion**: uploads are staged, hashed with SHA-256 while they
//!   stream, and renamed into place only once complete
//! - **Cascading cleanup**: deleting the last file of a version removes the
//!   version, and deleting the last version removes the package and its record
//! - **Per-package locking**: concurrent mutations of one package are
//!   serialized, other packages proceed independently
//! - **Path safety**: every identifier is validated before the filesystem is
//!   touched
//!
//! ## Key Modules
//!
//! - [`coordinator`]: the registry operations
//! - [`store`]: artifact storage
//! - [`ledger`]: metadata records
//! - [`config`]: directory layout and limits
//! - [`error`]: error classification and response bodies
//! - [`validation`]: identifier checks

pub mod config;
pub mod coordinator;
pub mod error;
pub mod hash_utils;
pub mod ledger;
pub mod locks;
pub mod store;
pub mod types;
pub mod validation;

// Re-export key types for convenience
pub use config::RegistryConfig;
pub use coordinator::Coordinator;
pub use error::{ApiErrorResponse, ErrorCode, RegistryError, RegistryResult};
pub use ledger::{JsonFileLedger, MetadataLedger, PackageRecord};
pub use store::{bytes_stream, ArtifactStore, ByteStream, FsArtifactStore};
pub use types::{UploadRequest, UploadResponse};
