//! # Input Validation Utilities
//!
//! Path-safety checks applied to every package, version and filename before
//! either the store or the ledger touch the filesystem.
//!
//! ```rust
//! use pkg_registry::validation::{validate_file_key, validate_package_name};
//!
//! assert!(validate_package_name("my-agent").is_ok());
//! assert!(validate_file_key("my-agent", "1.0.0", "../../etc/passwd").is_err());
//! ```

pub mod error;
pub mod identifiers;
pub mod limits;

pub use self::{
    error::ValidationError,
    identifiers::{
        resolve_within, validate_file_key, validate_filename, validate_identifier,
        validate_package_name, validate_version,
    },
    limits::{
        check_upload_size, DEFAULT_UPLOAD_FILENAME, MAX_FILENAME_LENGTH, MAX_PACKAGE_NAME_LENGTH,
        MAX_UPLOAD_SIZE, MAX_VERSION_LENGTH,
    },
};

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;
