//! # Filter Descriptors
//!
//! Caller-facing filter shapes. Operators arrive as raw tokens and are
//! parsed at build time so that an unknown token surfaces as
//! `INVALID_FILTER` rather than a deserialization failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{CrudError, CrudResult};
use crate::sql::quote_identifier;
use crate::store::SqlValue;

/// Closed set of comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    In,
    IsNull,
    NotNull,
}

impl FilterOperator {
    /// Parse an operator token (names or symbols, case-insensitive)
    pub fn parse(token: &str) -> CrudResult<Self> {
        let op = match token.trim().to_lowercase().as_str() {
            "eq" | "=" => FilterOperator::Eq,
            "ne" | "neq" | "!=" | "<>" => FilterOperator::Ne,
            "lt" | "<" => FilterOperator::Lt,
            "lte" | "<=" => FilterOperator::Lte,
            "gt" | ">" => FilterOperator::Gt,
            "gte" | ">=" => FilterOperator::Gte,
            "like" => FilterOperator::Like,
            "in" => FilterOperator::In,
            "is_null" | "isnull" => FilterOperator::IsNull,
            "not_null" | "notnull" | "is_not_null" => FilterOperator::NotNull,
            other => {
                return Err(CrudError::InvalidFilter(format!(
                    "unsupported operator '{}'",
                    other
                )))
            }
        };
        Ok(op)
    }

    /// Canonical token
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Ne => "ne",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Like => "like",
            FilterOperator::In => "in",
            FilterOperator::IsNull => "is_null",
            FilterOperator::NotNull => "not_null",
        }
    }

    /// SQL text following the quoted column
    pub fn sql_symbol(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "<>",
            FilterOperator::Lt => "<",
            FilterOperator::Lte => "<=",
            FilterOperator::Gt => ">",
            FilterOperator::Gte => ">=",
            FilterOperator::Like => "LIKE",
            FilterOperator::In => "IN",
            FilterOperator::IsNull => "IS NULL",
            FilterOperator::NotNull => "IS NOT NULL",
        }
    }

    /// Null checks bind no parameter
    pub fn binds_value(&self) -> bool {
        !matches!(self, FilterOperator::IsNull | FilterOperator::NotNull)
    }
}

/// A single column comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub column: String,

    /// Operator token, e.g. `eq`, `>=`, `in`
    #[serde(alias = "op")]
    pub operator: String,

    #[serde(default)]
    pub value: Value,
}

impl FilterDescriptor {
    pub fn new(column: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            value,
        }
    }

    /// Equality filter
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, "eq", value)
    }

    /// Membership filter
    pub fn in_list(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(column, "in", Value::Array(values))
    }
}

/// How the filters of one group combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[serde(alias = "and")]
    And,
    #[default]
    #[serde(alias = "or")]
    Or,
}

impl LogicalOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            LogicalOperator::And => " AND ",
            LogicalOperator::Or => " OR ",
        }
    }
}

/// Filters joined by one logical operator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterGroup {
    #[serde(default)]
    pub filters: Vec<FilterDescriptor>,

    #[serde(default)]
    pub operator: LogicalOperator,
}

impl FilterGroup {
    pub fn new(operator: LogicalOperator, filters: Vec<FilterDescriptor>) -> Self {
        Self { filters, operator }
    }
}

/// Global search pattern placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMode {
    #[serde(alias = "exact")]
    Exact,
    #[serde(alias = "starts_with", alias = "startsWith")]
    StartsWith,
    #[serde(alias = "ends_with", alias = "endsWith")]
    EndsWith,
    #[default]
    #[serde(alias = "contains")]
    Contains,
}

impl MatchMode {
    /// LIKE pattern for a (trimmed) term
    pub fn pattern(&self, term: &str) -> String {
        match self {
            MatchMode::Exact => term.to_string(),
            MatchMode::StartsWith => format!("{}%", term),
            MatchMode::EndsWith => format!("%{}", term),
            MatchMode::Contains => format!("%{}%", term),
        }
    }
}

/// Free-text search across several columns
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSearch {
    #[serde(default)]
    pub term: String,

    /// Explicit columns; empty selects text columns automatically
    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub match_mode: MatchMode,

    #[serde(default)]
    pub case_sensitive: bool,
}

impl GlobalSearch {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Default::default()
        }
    }

    pub fn in_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }
}

/// SQL fragment with its positional values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clause {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Clause {
    pub fn new(sql: String, params: Vec<SqlValue>) -> Self {
        Self { sql, params }
    }

    /// `"<column>" IS NULL` and friends
    pub fn unary(column: &str, op: FilterOperator) -> Self {
        Self::new(
            format!("{} {}", quote_identifier(column), op.sql_symbol()),
            Vec::new(),
        )
    }
}

/// Conjunction of clauses, shared by a SELECT and its COUNT
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    clauses: Vec<String>,
    params: Vec<SqlValue>,
}

impl Predicate {
    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause.sql);
        self.params.extend(clause.params);
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// ` WHERE a AND b`, or empty when there are no clauses
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}
