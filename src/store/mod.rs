//! # Store Collaborators
//!
//! Boundary traits for the catalog and the backing store, plus the SQLite
//! connector used by the binary and the integration tests.
//!
//! The engine never talks to a driver directly. Reads go through
//! [`SqlStore::count`] and [`SqlStore::open_cursor`]; writes go through
//! [`SqlStore::execute_batch`], which only accepts a [`WriteBatch`]. A
//! `WriteBatch` can only be assembled by the mutation gateway, so no other
//! caller can reach the write executor.

mod errors;
pub mod sqlite;
mod value;

pub use errors::{StoreError, StoreResult};
pub use sqlite::SqliteStore;
pub use value::SqlValue;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mutation::CrudOperation;
use crate::schema::ColumnMetadata;

/// A row as returned by a cursor, in projection order
pub type RawRow = Vec<SqlValue>;

/// Offset+limit idiom understood by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagingStyle {
    /// `OFFSET ? ROWS FETCH NEXT ? ROWS ONLY` (offset, limit)
    OffsetFetch,
    /// `LIMIT ? OFFSET ?` (limit, offset)
    LimitOffset,
}

impl Default for PagingStyle {
    fn default() -> Self {
        PagingStyle::OffsetFetch
    }
}

/// Column metadata lookup
pub trait Catalog: Send + Sync {
    /// Columns of `table` in catalog ordinal order, sensitive ones included
    fn table_columns(&self, table: &str) -> StoreResult<Vec<ColumnMetadata>>;
}

/// Server-side cursor over a result set
pub trait RowCursor: Send {
    /// Column labels in projection order
    fn columns(&self) -> &[String];

    /// Fetch up to the cursor's fetch size rows; an empty batch means exhausted
    fn next_batch(&mut self) -> StoreResult<Vec<RawRow>>;

    /// Release the underlying resource. Must be idempotent.
    fn close(&mut self);
}

/// Parameterized execution primitives with positional binding
pub trait SqlStore: Send + Sync {
    /// Paging idiom appended by the query builder
    fn paging_style(&self) -> PagingStyle;

    /// Run a `SELECT COUNT(*)` statement
    fn count(&self, sql: &str, params: &[SqlValue]) -> StoreResult<u64>;

    /// Open a forward-only cursor fetching `fetch_size` rows at a time
    fn open_cursor(
        &self,
        sql: &str,
        params: &[SqlValue],
        fetch_size: usize,
    ) -> StoreResult<Box<dyn RowCursor>>;

    /// Execute every statement of the batch atomically
    fn execute_batch(&self, batch: &WriteBatch) -> StoreResult<Vec<ExecOutcome>>;
}

/// A single parameterized write statement
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub operation: CrudOperation,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Statements executed as one unit of work.
///
/// Constructed only by the mutation gateway.
#[derive(Debug, Clone)]
pub struct WriteBatch {
    trace_id: Uuid,
    statements: Vec<Statement>,
}

impl WriteBatch {
    pub(crate) fn new(trace_id: Uuid, statements: Vec<Statement>) -> Self {
        Self {
            trace_id,
            statements,
        }
    }

    /// Trace id of the audit context that produced this batch
    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// Statements in execution order
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Outcome of one executed statement
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    /// Identifier generated by an INSERT, when the store reports one
    pub generated_id: Option<SqlValue>,
}
