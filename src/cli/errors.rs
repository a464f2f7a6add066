//! CLI-specific error types

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::errors::CrudError;
use crate::store::StoreError;
use crate::transfer::TransferError;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI errors. All are fatal for the invocation.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid request: {0}")]
    Request(#[from] serde_json::Error),

    #[error("Empty input")]
    EmptyInput,

    #[error("Failed to open database: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crud(#[from] CrudError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl CliError {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "CONFIG_ERROR",
            CliError::Io(_) => "IO_ERROR",
            CliError::Request(_) | CliError::EmptyInput => "INVALID_REQUEST",
            CliError::Store(_) => "STORE_ERROR",
            CliError::Crud(e) => e.code(),
            CliError::Transfer(e) => e.code(),
        }
    }
}
