//! # Import and Export
//!
//! Moves table data in and out as CSV or JSON documents.
//!
//! Imports parse the document into bulk rows and hand them to the bulk
//! orchestrator, so every row goes through the same column checks, batching
//! and audit trail as a bulk request. Exports read through a record stream
//! and write rows as they arrive; nothing is buffered beyond one fetch.
//!
//! A CSV export with headers imports back unchanged: empty cells are read
//! as NULL and NULLs are written as empty cells.

mod export;
mod import;
mod request;

pub use export::{write_export, ExportSummary, TransferError, TransferResult};
pub use import::{parse_rows, to_bulk_request};
pub use request::{ExportFormat, ExportRequest, ImportFormat, ImportRequest};
