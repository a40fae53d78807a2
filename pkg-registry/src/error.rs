//! # Error Handling and Response Types
//!
//! Every engine operation returns [`RegistryResult`]. Errors are classified
//! by [`ErrorCode`] so the transport in front of the engine can map them to
//! a client-facing status without inspecting messages.
//!
//! ## Error Response Format
//!
//! ```json
//! {
//!   "error": "Package 'demo' not found",
//!   "code": "not_found",
//!   "details": null,
//!   "timestamp": "2024-01-01T12:00:00Z"
//! }
//! ```
//!
//! ## Error Classifications
//!
//! - **Invalid identifier** (400 Bad Request): path-unsafe or malformed names
//! - **Not Found** (404 Not Found): missing package, version or file
//! - **Payload too large** (413): upload exceeded the configured size limit
//! - **Ingest failure** (500): I/O or stream failure while storing an upload
//! - **Internal Errors** (500): everything else

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::validation::ValidationError;

/// Standardized error response body.
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<Value>,
    pub timestamp: String,
}

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidIdentifier,
    NotFound,
    PayloadTooLarge,
    IngestFailure,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidIdentifier => "invalid_identifier",
            ErrorCode::NotFound => "not_found",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::IngestFailure => "ingest_failure",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidIdentifier => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::IngestFailure | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] ValidationError),

    #[error("{0}")]
    NotFound(String),

    #[error("Failed to upload file: {0}")]
    IngestFailure(String),

    #[error("Upload exceeds maximum size: {actual} > {max} bytes")]
    PayloadTooLarge { actual: u64, max: u64 },

    /// Store and ledger disagree about what exists. Logged and reconciled by
    /// the coordinator rather than returned to callers.
    #[error("Store and ledger disagree: {0}")]
    CascadeInconsistency(String),
}

impl RegistryError {
    pub fn package_not_found(package: &str) -> Self {
        RegistryError::NotFound(format!("Package '{package}' not found"))
    }

    pub fn version_not_found(package: &str, version: &str) -> Self {
        RegistryError::NotFound(format!(
            "Version '{version}' for package '{package}' not found"
        ))
    }

    pub fn file_not_found(package: &str, version: &str, filename: &str) -> Self {
        RegistryError::NotFound(format!(
            "File '{filename}' not found for package '{package}' version '{version}'"
        ))
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            RegistryError::InvalidIdentifier(_) => ErrorCode::InvalidIdentifier,
            RegistryError::NotFound(_) => ErrorCode::NotFound,
            RegistryError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            RegistryError::IngestFailure(_) => ErrorCode::IngestFailure,
            RegistryError::Io(_)
            | RegistryError::Json(_)
            | RegistryError::CascadeInconsistency(_) => ErrorCode::InternalError,
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            RegistryError::InvalidIdentifier(e) => Some(json!({ "field": e.field() })),
            RegistryError::PayloadTooLarge { actual, max } => {
                Some(json!({ "actual": actual, "max": max }))
            }
            _ => None,
        }
    }

    pub fn to_error_response(&self) -> ApiErrorResponse {
        ApiErrorResponse {
            error: self.to_string(),
            code: self.error_code().as_str().to_string(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.error_code().http_status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        (status, axum::Json(self.to_error_response())).into_response()
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
