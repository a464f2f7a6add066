//! Mutation request and response shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::operation::CrudOperation;
use crate::filter::FilterDescriptor;

/// Column name and the value to write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnValue {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl ColumnValue {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Single-row write against one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRequest {
    pub table: String,

    pub operation: CrudOperation,

    #[serde(default)]
    pub columns: Vec<ColumnValue>,

    /// Required for UPDATE and DELETE
    #[serde(default)]
    pub filters: Vec<FilterDescriptor>,

    /// Free-text reason forwarded to the audit sink
    #[serde(default)]
    pub reason: Option<String>,
}

impl MutationRequest {
    pub fn new(table: impl Into<String>, operation: CrudOperation) -> Self {
        Self {
            table: table.into(),
            operation,
            columns: Vec::new(),
            filters: Vec::new(),
            reason: None,
        }
    }

    pub fn create(table: impl Into<String>) -> Self {
        Self::new(table, CrudOperation::Create)
    }

    pub fn update(table: impl Into<String>) -> Self {
        Self::new(table, CrudOperation::Update)
    }

    pub fn delete(table: impl Into<String>) -> Self {
        Self::new(table, CrudOperation::Delete)
    }

    pub fn set(mut self, column: impl Into<String>, value: Value) -> Self {
        self.columns.push(ColumnValue::new(column, value));
        self
    }

    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Outcome of a single-row write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    pub affected_rows: u64,

    /// Identifier generated by CREATE, when the store reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_id: Option<Value>,
}
