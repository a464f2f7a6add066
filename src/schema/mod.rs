//! # Schema
//!
//! Table allow-list, sensitive-column redaction, and per-request column
//! metadata resolution.

mod allowlist;
mod resolver;
mod types;

pub use allowlist::{is_valid_identifier, AllowList, SensitiveColumns};
pub use resolver::{SchemaMetadataResolver, TableColumns};
pub use types::{
    ColumnMetadata, ForeignKeyRef, TableSchema, TemporalKind, DEFAULT_GLOBAL_SEARCH_COLUMN_LIMIT,
};
