//! Bulk request and result shapes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ErrorKind;
use crate::filter::FilterDescriptor;
use crate::mutation::{ColumnValue, CrudOperation};

/// Audit reason used when a bulk request carries no metadata
pub const DEFAULT_BULK_REASON: &str = "bulk_operation";

/// One row of a bulk request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkRow {
    #[serde(default)]
    pub columns: Vec<ColumnValue>,
    #[serde(default)]
    pub filters: Vec<FilterDescriptor>,
}

impl BulkRow {
    pub fn new(columns: Vec<ColumnValue>, filters: Vec<FilterDescriptor>) -> Self {
        Self { columns, filters }
    }
}

/// Multi-row write against one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub table: String,

    pub operation: CrudOperation,

    #[serde(default)]
    pub rows: Vec<BulkRow>,

    /// Rows per batch; the configured default when absent
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Validate and preview without touching the store
    #[serde(default)]
    pub dry_run: bool,

    /// Keep going after a failed batch
    #[serde(default)]
    pub skip_on_error: bool,

    /// Audit reason
    #[serde(default)]
    pub metadata: Option<String>,
}

impl BulkRequest {
    pub fn new(table: impl Into<String>, operation: CrudOperation, rows: Vec<BulkRow>) -> Self {
        Self {
            table: table.into(),
            operation,
            rows,
            batch_size: None,
            dry_run: false,
            skip_on_error: false,
            metadata: None,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn skip_on_error(mut self) -> Self {
        self.skip_on_error = true;
        self
    }

    pub fn metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkStatus {
    Success,
    PartialSuccess,
    Failure,
    ValidationFailed,
    DryRunPreview,
}

/// Problem with one row; row numbers are 1-based
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row_number: usize,
    pub message: String,
    pub kind: ErrorKind,
}

impl RowError {
    pub fn new(row_number: usize, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            row_number,
            message: message.into(),
            kind,
        }
    }
}

/// What a dry run would have done
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunPreview {
    pub estimated_affected_rows: usize,
    pub execution_plan: String,
    pub validation_warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult {
    pub total_rows: usize,

    /// Rows in committed batches
    pub success_count: usize,

    /// Rows with validation errors, or rows in failed batches
    pub failure_count: usize,

    /// Rows in batches that reached the store
    pub processed_rows: usize,

    /// Rows the store reported as affected
    pub affected_rows: u64,

    pub status: BulkStatus,

    pub errors: Vec<RowError>,

    pub duration_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run_preview: Option<DryRunPreview>,

    /// Trace id shared by every batch, when execution started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Uuid>,
}
