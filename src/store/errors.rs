//! # Store Errors
//!
//! Errors raised by store connectors. These carry the raw driver text and
//! are only ever logged; the engine wraps them in
//! [`CrudError::Execution`](crate::errors::CrudError) before they reach a caller.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store connector errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Constraint violation (unique, not-null, foreign key, check)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// SQLite driver error
    #[error("SQLite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    /// Driver error reported by a non-SQLite connector
    #[error("Driver error: {0}")]
    Driver(String),

    /// Fetch attempted after the cursor was released
    #[error("Cursor already closed")]
    CursorClosed,

    /// Connection lock poisoned by a panicking holder
    #[error("Store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Check if this is a constraint violation
    pub fn is_constraint(&self) -> bool {
        matches!(self, StoreError::Constraint(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(
                    message
                        .clone()
                        .unwrap_or_else(|| "constraint failed".to_string()),
                )
            }
            _ => StoreError::Sqlite(err),
        }
    }
}
