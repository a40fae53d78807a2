//! # Input Validation: Size Limits
//!
//! Length limits for identifiers and the fallback upload size limit.

use crate::error::{RegistryError, RegistryResult};

/// Default maximum upload size (100 MB)
pub const MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum allowed package name length
pub const MAX_PACKAGE_NAME_LENGTH: usize = 214;

/// Maximum allowed version string length
pub const MAX_VERSION_LENGTH: usize = 64;

/// Maximum allowed filename length (255 chars for most filesystems)
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Filename used when an upload arrives without one
pub const DEFAULT_UPLOAD_FILENAME: &str = "unknown.whl";

/// Check a running byte count against an upload limit.
pub fn check_upload_size(size: u64, max_size: u64) -> RegistryResult<()> {
    if size > max_size {
        return Err(RegistryError::PayloadTooLarge {
            actual: size,
            max: max_size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_upload_size() {
        assert!(check_upload_size(1024, MAX_UPLOAD_SIZE).is_ok());
        assert!(check_upload_size(MAX_UPLOAD_SIZE, MAX_UPLOAD_SIZE).is_ok());
        assert!(matches!(
            check_upload_size(MAX_UPLOAD_SIZE + 1, MAX_UPLOAD_SIZE),
            Err(RegistryError::PayloadTooLarge { .. })
        ));
    }
}
