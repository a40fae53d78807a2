//! # Input Validation: Package, Version and Filename Identifiers
//!
//! Identifiers become single path segments under the store and ledger roots,
//! so each one must resolve to exactly one normal path component.

use std::path::{Component, Path, PathBuf};

use super::error::ValidationError;
use super::limits::{MAX_FILENAME_LENGTH, MAX_PACKAGE_NAME_LENGTH, MAX_VERSION_LENGTH};
use super::ValidationResult;

const RESERVED_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const FORBIDDEN_CHARACTERS: &[char] = &['*', '?', '"', '<', '>', '|'];

/// Validate a single identifier segment.
///
/// Rejects empty or overlong values, NUL and control characters, `..`,
/// path separators, drive prefixes, leading dots and reserved device names.
pub fn validate_identifier(field: &'static str, value: &str, max: usize) -> ValidationResult<()> {
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }

    if value.len() > max {
        return Err(ValidationError::TooLong {
            field,
            actual: value.len(),
            max,
        });
    }

    if value.contains('\0') {
        return Err(ValidationError::NullBytes { field });
    }

    if value.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters { field });
    }

    if value.contains("..") {
        return Err(ValidationError::PathTraversal {
            field,
            value: value.to_string(),
        });
    }

    if value.contains('/') || value.contains('\\') || value.contains(':') {
        return Err(ValidationError::PathSeparator {
            field,
            value: value.to_string(),
        });
    }

    if value.contains(FORBIDDEN_CHARACTERS) {
        return Err(ValidationError::InvalidCharacters {
            field,
            value: value.to_string(),
        });
    }

    // Temp and partial files live under dot-prefixed names.
    if value.starts_with('.') {
        return Err(ValidationError::HiddenName {
            field,
            value: value.to_string(),
        });
    }

    let base_name = value.split('.').next().unwrap_or(value);
    if RESERVED_WINDOWS_NAMES
        .iter()
        .any(|reserved| base_name.eq_ignore_ascii_case(reserved))
    {
        return Err(ValidationError::ReservedName {
            field,
            value: value.to_string(),
        });
    }

    // Whatever passed the textual checks must still be one plain component.
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(ValidationError::PathTraversal {
            field,
            value: value.to_string(),
        }),
    }
}

pub fn validate_package_name(name: &str) -> ValidationResult<()> {
    validate_identifier("package", name, MAX_PACKAGE_NAME_LENGTH)
}

pub fn validate_version(version: &str) -> ValidationResult<()> {
    validate_identifier("version", version, MAX_VERSION_LENGTH)
}

pub fn validate_filename(filename: &str) -> ValidationResult<()> {
    validate_identifier("filename", filename, MAX_FILENAME_LENGTH)
}

/// Validate a `(package, version, filename)` triple in order.
pub fn validate_file_key(package: &str, version: &str, filename: &str) -> ValidationResult<()> {
    validate_package_name(package)?;
    validate_version(version)?;
    validate_filename(filename)
}

/// Join validated segments onto `root`, refusing anything that would land
/// outside of it.
pub fn resolve_within(root: &Path, segments: &[&str]) -> ValidationResult<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in segments {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => path.push(part),
            _ => {
                return Err(ValidationError::PathTraversal {
                    field: "path",
                    value: segment.to_string(),
                })
            }
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers_pass() {
        assert!(validate_package_name("my-agent").is_ok());
        assert!(validate_package_name("agent_tools.core").is_ok());
        assert!(validate_version("1.0.0").is_ok());
        assert!(validate_version("2.0.0-rc.1+build.5").is_ok());
        assert!(validate_filename("my_agent-1.0.0-py3-none-any.whl").is_ok());
        assert!(validate_filename("bundle.tar.gz").is_ok());
    }

    #[test]
    fn test_path_traversal_rejected() {
        for bad in ["..", "../etc", "a..b", "...."] {
            assert!(
                matches!(
                    validate_package_name(bad),
                    Err(ValidationError::PathTraversal { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_separators_rejected() {
        for bad in ["a/b", "/etc", "a\\b", "C:evil", "\\\\server"] {
            assert!(validate_filename(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_control_and_null_rejected() {
        assert_eq!(
            validate_version("1.0\0"),
            Err(ValidationError::NullBytes { field: "version" })
        );
        assert_eq!(
            validate_version("1.0\n"),
            Err(ValidationError::ControlCharacters { field: "version" })
        );
    }

    #[test]
    fn test_length_limits() {
        assert_eq!(
            validate_package_name(""),
            Err(ValidationError::Empty { field: "package" })
        );
        let long = "a".repeat(MAX_VERSION_LENGTH + 1);
        assert!(matches!(
            validate_version(&long),
            Err(ValidationError::TooLong { .. })
        ));
        assert!(validate_filename(&"f".repeat(MAX_FILENAME_LENGTH)).is_ok());
    }

    #[test]
    fn test_hidden_and_reserved_rejected() {
        assert!(matches!(
            validate_filename(".hidden"),
            Err(ValidationError::HiddenName { .. })
        ));
        assert!(matches!(
            validate_filename("nul.txt"),
            Err(ValidationError::ReservedName { .. })
        ));
        assert!(matches!(
            validate_package_name("CON"),
            Err(ValidationError::ReservedName { .. })
        ));
        assert!(validate_filename("console.txt").is_ok());
    }

    #[test]
    fn test_file_key_reports_first_bad_field() {
        let err = validate_file_key("pkg", "../1.0", "file.whl").unwrap_err();
        assert_eq!(err.field(), "version");
    }

    #[test]
    fn test_resolve_within() {
        let root = Path::new("/data/packages");
        assert_eq!(
            resolve_within(root, &["pkg", "1.0", "file.whl"]).unwrap(),
            PathBuf::from("/data/packages/pkg/1.0/file.whl")
        );
        assert!(resolve_within(root, &["pkg", ".."]).is_err());
        assert!(resolve_within(root, &["/etc"]).is_err());
        assert!(resolve_within(root, &["a/b"]).is_err());
    }
}
