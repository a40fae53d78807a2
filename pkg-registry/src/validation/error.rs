//! # Validation Error Types

/// Error types for identifier validation failures. Every variant names the
/// field (`package`, `version` or `filename`) that was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} too long: {actual} exceeds maximum {max}")]
    TooLong {
        field: &'static str,
        actual: usize,
        max: usize,
    },

    #[error("{field} contains null bytes")]
    NullBytes { field: &'static str },

    #[error("{field} contains control characters")]
    ControlCharacters { field: &'static str },

    #[error("Path traversal detected in {field}: {value}")]
    PathTraversal { field: &'static str, value: String },

    #[error("{field} contains a path separator or drive prefix: {value}")]
    PathSeparator { field: &'static str, value: String },

    #[error("Invalid characters in {field}: {value}")]
    InvalidCharacters { field: &'static str, value: String },

    #[error("{field} cannot start with '.': {value}")]
    HiddenName { field: &'static str, value: String },

    #[error("{field} '{value}' is reserved on Windows systems")]
    ReservedName { field: &'static str, value: String },
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Empty { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::NullBytes { field }
            | ValidationError::ControlCharacters { field }
            | ValidationError::PathTraversal { field, .. }
            | ValidationError::PathSeparator { field, .. }
            | ValidationError::InvalidCharacters { field, .. }
            | ValidationError::HiddenName { field, .. }
            | ValidationError::ReservedName { field, .. } => field,
        }
    }
}
