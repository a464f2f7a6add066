//! # Column Metadata
//!
//! Describes the columns of an allow-listed table as reported by the
//! catalog. Metadata is recomputed on every request.

use serde::{Deserialize, Serialize};

/// Maximum number of text columns picked for global search when the caller
/// does not name any
pub const DEFAULT_GLOBAL_SEARCH_COLUMN_LIMIT: usize = 8;

/// Foreign key target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table: String,

    /// Referenced column; `None` when the key targets the primary key implicitly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

/// Metadata for one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    /// Column name as stored in the catalog
    pub name: String,

    /// Catalog type name without size arguments (VARCHAR, NUMBER, TIMESTAMP...)
    #[serde(rename = "type")]
    pub type_tag: String,

    pub nullable: bool,

    pub primary_key: bool,

    pub unique: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,

    /// Default expression, verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyRef>,
}

/// Temporal families normalized by the row mapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    Timestamp,
    Date,
    Time,
}

impl ColumnMetadata {
    /// Create a nullable, non-key column
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            nullable: true,
            primary_key: false,
            unique: false,
            length: None,
            precision: None,
            scale: None,
            default_value: None,
            comment: None,
            foreign_key: None,
        }
    }

    /// Mark as primary key (implies NOT NULL and unique)
    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Text-typed columns are candidates for global search
    pub fn is_text(&self) -> bool {
        let t = self.type_tag.to_uppercase();
        t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT")
    }

    /// Temporal family of this column, if any
    pub fn temporal_kind(&self) -> Option<TemporalKind> {
        let t = self.type_tag.to_uppercase();
        if t.contains("TIMESTAMP") || t.contains("DATETIME") {
            Some(TemporalKind::Timestamp)
        } else if t.contains("DATE") {
            Some(TemporalKind::Date)
        } else if t.contains("TIME") {
            Some(TemporalKind::Time)
        } else {
            None
        }
    }
}

/// Schema response for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnMetadata>,
}
