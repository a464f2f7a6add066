//! Import and export request shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::filter::FilterDescriptor;
use crate::mutation::CrudOperation;
use crate::query::{OrderDirection, QueryRequest};

/// Document format accepted by an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportFormat {
    #[serde(alias = "csv")]
    Csv,
    #[serde(alias = "json")]
    Json,
}

impl ImportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportFormat::Csv => "csv",
            ImportFormat::Json => "json",
        }
    }
}

/// Document format produced by an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportFormat {
    #[serde(alias = "csv")]
    Csv,
    /// One JSON array of objects
    #[serde(alias = "json")]
    Json,
    /// One JSON object per line
    #[serde(alias = "jsonl")]
    Jsonl,
}

impl ExportFormat {
    /// File extension used for the default file name
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Jsonl => "jsonl",
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_import_operation() -> CrudOperation {
    CrudOperation::Create
}

/// Rows to load into one table from a CSV or JSON document.
///
/// Imports preview by default; set `dry_run` to false to write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub table: String,

    pub format: ImportFormat,

    /// CSV with a header row, or a JSON array of objects
    pub data: String,

    #[serde(default = "default_import_operation")]
    pub operation: CrudOperation,

    #[serde(default = "default_true")]
    pub dry_run: bool,

    #[serde(default)]
    pub skip_on_error: bool,

    /// Source field name -> column name
    #[serde(default)]
    pub column_mapping: BTreeMap<String, String>,

    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Audit reason; generated from the format when absent
    #[serde(default)]
    pub metadata: Option<String>,
}

impl ImportRequest {
    pub fn new(table: impl Into<String>, format: ImportFormat, data: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            format,
            data: data.into(),
            operation: CrudOperation::Create,
            dry_run: true,
            skip_on_error: false,
            column_mapping: BTreeMap::new(),
            batch_size: None,
            metadata: None,
        }
    }

    /// Write the rows instead of previewing them
    pub fn commit(mut self) -> Self {
        self.dry_run = false;
        self
    }

    pub fn skip_on_error(mut self) -> Self {
        self.skip_on_error = true;
        self
    }

    pub fn map_column(mut self, source: impl Into<String>, column: impl Into<String>) -> Self {
        self.column_mapping.insert(source.into(), column.into());
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Column a source field lands in
    pub fn mapped_name<'a>(&'a self, source: &'a str) -> &'a str {
        self.column_mapping
            .get(source)
            .map(String::as_str)
            .unwrap_or(source)
    }
}

/// Rows to write out of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub table: String,

    pub format: ExportFormat,

    #[serde(default)]
    pub filters: Vec<FilterDescriptor>,

    /// Columns to write, in order; every visible column when empty
    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub order_by: Option<String>,

    #[serde(default)]
    pub order_direction: Option<OrderDirection>,

    /// CSV only
    #[serde(default = "default_true")]
    pub include_headers: bool,

    #[serde(default)]
    pub file_name: Option<String>,
}

impl ExportRequest {
    pub fn new(table: impl Into<String>, format: ExportFormat) -> Self {
        Self {
            table: table.into(),
            format,
            filters: Vec::new(),
            columns: Vec::new(),
            order_by: None,
            order_direction: None,
            include_headers: true,
            file_name: None,
        }
    }

    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn order(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(column.into());
        self.order_direction = Some(direction);
        self
    }

    pub fn without_headers(mut self) -> Self {
        self.include_headers = false;
        self
    }

    /// Unpaged read behind this export
    pub fn query(&self) -> QueryRequest {
        QueryRequest {
            table: self.table.clone(),
            filters: self.filters.clone(),
            order_by: self.order_by.clone(),
            order_direction: self.order_direction,
            ..Default::default()
        }
    }

    /// Requested file name, or `<table>_export.<ext>`
    pub fn file_name(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| format!("{}_export.{}", self.table, self.format.extension()))
    }
}
