//! # Engine Errors
//!
//! Error taxonomy shared by every entry point of the engine.
//!
//! Each variant maps to a stable [`ErrorKind`] so callers (and bulk row
//! errors) can classify failures without parsing messages. Store-level
//! failures keep the driver error as their `source` for logging, but the
//! user-visible message never echoes the raw driver text.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Result type for engine operations
pub type CrudResult<T> = Result<T, CrudError>;

/// Stable error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    TableNotAllowed,
    ColumnNotAllowed,
    InvalidFilter,
    ValidationFailed,
    AccessDenied,
    ExecutionError,
    MetadataUnavailable,
}

impl ErrorKind {
    /// Get the error code string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TableNotAllowed => "TABLE_NOT_ALLOWED",
            ErrorKind::ColumnNotAllowed => "COLUMN_NOT_ALLOWED",
            ErrorKind::InvalidFilter => "INVALID_FILTER",
            ErrorKind::ValidationFailed => "VALIDATION_FAILED",
            ErrorKind::AccessDenied => "ACCESS_DENIED",
            ErrorKind::ExecutionError => "EXECUTION_ERROR",
            ErrorKind::MetadataUnavailable => "METADATA_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine errors
#[derive(Debug, Error)]
pub enum CrudError {
    // ==================
    // Structural errors (detected before any store call)
    // ==================
    /// Table is not in the allow-list
    #[error("Table not allowed: {0}")]
    TableNotAllowed(String),

    /// Column could not be resolved against visible metadata
    #[error("Column not allowed: {0}")]
    ColumnNotAllowed(String),

    /// Unknown operator, malformed value, or missing required filter
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Request shape is invalid
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Read without a limit on the materializing path
    #[error("Query must include limit (max: {0}); use streaming for unbounded reads")]
    UnboundedQuery(u64),

    /// Limit exceeds maximum page size
    #[error("Limit {0} exceeds maximum {1}")]
    LimitExceeded(u64, u64),

    // ==================
    // Authorization
    // ==================
    /// Principal lacks the required capability
    #[error("Access denied: {0}")]
    AccessDenied(String),

    // ==================
    // Store
    // ==================
    /// Store-level failure, including constraint violations
    #[error("Execution error while {context}")]
    Execution {
        context: String,
        #[source]
        source: StoreError,
    },

    /// No catalog collaborator, or no visible columns
    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),
}

impl CrudError {
    /// Wrap a store error with a short description of what was being done
    pub fn execution(context: impl Into<String>, source: StoreError) -> Self {
        Self::Execution {
            context: context.into(),
            source,
        }
    }

    /// Stable category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrudError::TableNotAllowed(_) => ErrorKind::TableNotAllowed,
            CrudError::ColumnNotAllowed(_) => ErrorKind::ColumnNotAllowed,
            CrudError::InvalidFilter(_) => ErrorKind::InvalidFilter,
            CrudError::ValidationFailed(_)
            | CrudError::UnboundedQuery(_)
            | CrudError::LimitExceeded(_, _) => ErrorKind::ValidationFailed,
            CrudError::AccessDenied(_) => ErrorKind::AccessDenied,
            CrudError::Execution { .. } => ErrorKind::ExecutionError,
            CrudError::MetadataUnavailable(_) => ErrorKind::MetadataUnavailable,
        }
    }

    /// Get the error code string
    pub fn code(&self) -> &'static str {
        self.kind().as_str()
    }

    /// True when the error was raised before touching the store
    pub fn is_structural(&self) -> bool {
        !matches!(self, CrudError::Execution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CrudError::TableNotAllowed("users".to_string()).kind(),
            ErrorKind::TableNotAllowed
        );
        assert_eq!(CrudError::UnboundedQuery(1000).kind(), ErrorKind::ValidationFailed);
        assert_eq!(
            CrudError::LimitExceeded(5000, 1000).code(),
            "VALIDATION_FAILED"
        );
    }

    #[test]
    fn test_execution_error_hides_driver_text() {
        let err = CrudError::execution(
            "executing UPDATE on orders",
            StoreError::Driver("UNIQUE constraint failed: orders.code".to_string()),
        );
        let message = err.to_string();
        assert!(message.contains("UPDATE on orders"));
        assert!(!message.contains("UNIQUE constraint"));
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
        assert!(!err.is_structural());
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::ColumnNotAllowed).unwrap();
        assert_eq!(json, "\"COLUMN_NOT_ALLOWED\"");
    }
}
