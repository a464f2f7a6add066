//! # Bulk Operations
//!
//! Multi-row writes executed in batches with partial-failure reporting.

mod orchestrator;
mod request;

pub use orchestrator::{BulkOperationOrchestrator, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
pub use request::{
    BulkRequest, BulkResult, BulkRow, BulkStatus, DryRunPreview, RowError, DEFAULT_BULK_REASON,
};
