//! Query request and response shapes.

use serde::{Deserialize, Serialize};

use crate::filter::{FilterDescriptor, FilterGroup, GlobalSearch};
use crate::schema::ColumnMetadata;
use crate::stream::Record;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    #[default]
    #[serde(alias = "asc")]
    Asc,
    #[serde(alias = "desc")]
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// A read against one table.
///
/// Without `order_by` the row order is whatever the store returns and is
/// not stable across calls, so paging without an order may skip or repeat
/// rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub table: String,

    #[serde(default)]
    pub filters: Vec<FilterDescriptor>,

    #[serde(default)]
    pub filter_groups: Vec<FilterGroup>,

    #[serde(default)]
    pub global_search: Option<GlobalSearch>,

    #[serde(default)]
    pub order_by: Option<String>,

    #[serde(default)]
    pub order_direction: Option<OrderDirection>,

    /// Page size; offset is ignored when absent
    #[serde(default)]
    pub limit: Option<u64>,

    #[serde(default)]
    pub offset: Option<u64>,
}

impl QueryRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn group(mut self, group: FilterGroup) -> Self {
        self.filter_groups.push(group);
        self
    }

    pub fn search(mut self, search: GlobalSearch) -> Self {
        self.global_search = Some(search);
        self
    }

    pub fn order(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(column.into());
        self.order_direction = Some(direction);
        self
    }

    pub fn page(mut self, limit: u64, offset: u64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

/// One page of rows plus the unpaged total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Record>,
    pub total_count: u64,
    pub columns: Vec<ColumnMetadata>,
}
