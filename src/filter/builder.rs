//! # Filter Expression Builder
//!
//! Turns filter descriptors into parameterized SQL. Column names are
//! resolved against visible metadata and emitted in their catalog spelling;
//! every user value goes to the parameter list.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use super::types::{Clause, FilterDescriptor, FilterGroup, FilterOperator, GlobalSearch, Predicate};
use crate::errors::{CrudError, CrudResult};
use crate::schema::{ColumnMetadata, TableColumns, DEFAULT_GLOBAL_SEARCH_COLUMN_LIMIT};
use crate::sql::{placeholders, quote_identifier};
use crate::store::SqlValue;

/// Builds predicates for one table's visible columns
#[derive(Debug, Clone, Copy)]
pub struct FilterExpressionBuilder {
    search_column_limit: usize,
}

impl Default for FilterExpressionBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_GLOBAL_SEARCH_COLUMN_LIMIT)
    }
}

impl FilterExpressionBuilder {
    pub fn new(search_column_limit: usize) -> Self {
        Self {
            search_column_limit: search_column_limit.max(1),
        }
    }

    /// Resolve a column reference case-insensitively
    pub fn resolve_column<'a>(
        &self,
        columns: &'a TableColumns,
        name: &str,
    ) -> CrudResult<&'a ColumnMetadata> {
        columns.resolve_column(name)
    }

    /// `"<column>" <symbol> ?` plus its values
    pub fn build_filter_clause(
        &self,
        columns: &TableColumns,
        filter: &FilterDescriptor,
    ) -> CrudResult<Clause> {
        let column = self.resolve_column(columns, &filter.column)?;
        let op = FilterOperator::parse(&filter.operator)?;
        let quoted = quote_identifier(&column.name);

        match op {
            op if !op.binds_value() => Ok(Clause::unary(&column.name, op)),
            FilterOperator::In => {
                let items = match &filter.value {
                    Value::Array(items) if !items.is_empty() => items,
                    Value::Array(_) => {
                        return Err(CrudError::InvalidFilter(format!(
                            "'in' on '{}' requires at least one value",
                            column.name
                        )))
                    }
                    _ => {
                        return Err(CrudError::InvalidFilter(format!(
                            "'in' on '{}' requires an array value",
                            column.name
                        )))
                    }
                };
                let params = items
                    .iter()
                    .map(|v| scalar(&column.name, v))
                    .collect::<CrudResult<Vec<_>>>()?;
                Ok(Clause::new(
                    format!("{} IN ({})", quoted, placeholders(params.len())),
                    params,
                ))
            }
            _ => {
                let value = scalar(&column.name, &filter.value)?;
                Ok(Clause::new(
                    format!("{} {} ?", quoted, op.sql_symbol()),
                    vec![value],
                ))
            }
        }
    }

    /// Parenthesized clauses joined by the group operator; `None` for an empty group
    pub fn build_filter_group(
        &self,
        columns: &TableColumns,
        group: &FilterGroup,
    ) -> CrudResult<Option<Clause>> {
        if group.filters.is_empty() {
            return Ok(None);
        }

        let mut parts = Vec::with_capacity(group.filters.len());
        let mut params = Vec::new();
        for filter in &group.filters {
            let clause = self.build_filter_clause(columns, filter)?;
            parts.push(clause.sql);
            params.extend(clause.params);
        }

        Ok(Some(Clause::new(
            format!("({})", parts.join(group.operator.as_sql())),
            params,
        )))
    }

    /// OR-joined LIKE over the search columns; `None` for a blank term
    pub fn build_global_search(
        &self,
        columns: &TableColumns,
        search: &GlobalSearch,
    ) -> CrudResult<Option<Clause>> {
        let term = search.term.trim();
        if term.is_empty() {
            return Ok(None);
        }

        let targets = self.search_columns(columns, search)?;
        if targets.is_empty() {
            debug!(table = columns.table(), "No text columns for global search");
            return Ok(None);
        }

        let pattern = search.match_mode.pattern(term);
        let (pattern, template) = if search.case_sensitive {
            (pattern, "{} LIKE ?")
        } else {
            (pattern.to_uppercase(), "UPPER({}) LIKE ?")
        };

        let parts: Vec<String> = targets
            .iter()
            .map(|name| template.replace("{}", &quote_identifier(name)))
            .collect();
        let params = vec![SqlValue::Text(pattern); parts.len()];

        Ok(Some(Clause::new(format!("({})", parts.join(" OR ")), params)))
    }

    /// Filters AND groups AND search
    pub fn build_predicate(
        &self,
        columns: &TableColumns,
        filters: &[FilterDescriptor],
        groups: &[FilterGroup],
        search: Option<&GlobalSearch>,
    ) -> CrudResult<Predicate> {
        let mut predicate = Predicate::default();

        for filter in filters {
            predicate.push(self.build_filter_clause(columns, filter)?);
        }
        for group in groups {
            if let Some(clause) = self.build_filter_group(columns, group)? {
                predicate.push(clause);
            }
        }
        if let Some(search) = search {
            if let Some(clause) = self.build_global_search(columns, search)? {
                predicate.push(clause);
            }
        }

        Ok(predicate)
    }

    fn search_columns(
        &self,
        columns: &TableColumns,
        search: &GlobalSearch,
    ) -> CrudResult<Vec<String>> {
        if search.columns.is_empty() {
            return Ok(columns
                .columns()
                .iter()
                .filter(|c| c.is_text())
                .take(self.search_column_limit)
                .map(|c| c.name.clone())
                .collect());
        }

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for name in &search.columns {
            let column = self.resolve_column(columns, name)?;
            if seen.insert(column.name.to_lowercase()) {
                resolved.push(column.name.clone());
            }
        }
        Ok(resolved)
    }
}

fn scalar(column: &str, value: &Value) -> CrudResult<SqlValue> {
    SqlValue::from_json(value).ok_or_else(|| {
        CrudError::InvalidFilter(format!("value for '{}' must be a scalar", column))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::filter::{LogicalOperator, MatchMode};
    use serde_json::json;

    fn columns() -> TableColumns {
        TableColumns::new(
            "tickets",
            vec![
                ColumnMetadata::new("id", "INTEGER").primary(),
                ColumnMetadata::new("Title", "VARCHAR").with_length(200),
                ColumnMetadata::new("status", "CHAR").with_length(1),
                ColumnMetadata::new("body", "CLOB"),
                ColumnMetadata::new("opened_at", "TIMESTAMP"),
            ],
        )
    }

    #[test]
    fn test_simple_clause() {
        let builder = FilterExpressionBuilder::default();
        let clause = builder
            .build_filter_clause(&columns(), &FilterDescriptor::new("TITLE", ">=", json!("m")))
            .unwrap();
        assert_eq!(clause.sql, "\"Title\" >= ?");
        assert_eq!(clause.params, vec![SqlValue::from("m")]);
    }

    #[test]
    fn test_in_expands_per_element() {
        let builder = FilterExpressionBuilder::default();
        let clause = builder
            .build_filter_clause(
                &columns(),
                &FilterDescriptor::in_list("status", vec![json!("A"), json!("B")]),
            )
            .unwrap();
        assert_eq!(clause.sql, "\"status\" IN (?, ?)");
        assert_eq!(clause.params.len(), 2);

        let empty = builder
            .build_filter_clause(&columns(), &FilterDescriptor::in_list("status", vec![]))
            .unwrap_err();
        assert_eq!(empty.kind(), ErrorKind::InvalidFilter);

        let not_array = builder
            .build_filter_clause(&columns(), &FilterDescriptor::new("status", "in", json!("A")))
            .unwrap_err();
        assert_eq!(not_array.kind(), ErrorKind::InvalidFilter);
    }

    #[test]
    fn test_null_checks_bind_nothing() {
        let builder = FilterExpressionBuilder::default();
        let clause = builder
            .build_filter_clause(&columns(), &FilterDescriptor::new("body", "not_null", json!(null)))
            .unwrap();
        assert_eq!(clause.sql, "\"body\" IS NOT NULL");
        assert!(clause.params.is_empty());
    }

    #[test]
    fn test_unknown_column_and_operator() {
        let builder = FilterExpressionBuilder::default();
        let err = builder
            .build_filter_clause(&columns(), &FilterDescriptor::eq("owner", json!(1)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNotAllowed);

        let err = builder
            .build_filter_clause(&columns(), &FilterDescriptor::new("id", "between", json!(1)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilter);
    }

    #[test]
    fn test_group_defaults_to_or_and_skips_empty() {
        let builder = FilterExpressionBuilder::default();
        let group = FilterGroup {
            filters: vec![
                FilterDescriptor::eq("status", json!("A")),
                FilterDescriptor::eq("status", json!("B")),
            ],
            operator: LogicalOperator::default(),
        };
        let clause = builder.build_filter_group(&columns(), &group).unwrap().unwrap();
        assert_eq!(clause.sql, "(\"status\" = ? OR \"status\" = ?)");

        let empty = FilterGroup::default();
        assert!(builder.build_filter_group(&columns(), &empty).unwrap().is_none());
    }

    #[test]
    fn test_global_search_auto_columns() {
        let builder = FilterExpressionBuilder::new(2);
        let clause = builder
            .build_global_search(&columns(), &GlobalSearch::new("  urgent "))
            .unwrap()
            .unwrap();
        assert_eq!(
            clause.sql,
            "(UPPER(\"Title\") LIKE ? OR UPPER(\"status\") LIKE ?)"
        );
        assert_eq!(clause.params, vec![SqlValue::from("%URGENT%"); 2]);
    }

    #[test]
    fn test_global_search_explicit_case_sensitive() {
        let builder = FilterExpressionBuilder::default();
        let search = GlobalSearch::new("Ab")
            .in_columns(vec!["body".into(), "BODY".into()])
            .with_match_mode(MatchMode::StartsWith)
            .case_sensitive(true);
        let clause = builder
            .build_global_search(&columns(), &search)
            .unwrap()
            .unwrap();
        assert_eq!(clause.sql, "(\"body\" LIKE ?)");
        assert_eq!(clause.params, vec![SqlValue::from("Ab%")]);

        let bad = GlobalSearch::new("x").in_columns(vec!["secret".into()]);
        assert_eq!(
            builder.build_global_search(&columns(), &bad).unwrap_err().kind(),
            ErrorKind::ColumnNotAllowed
        );
    }

    #[test]
    fn test_blank_search_is_noop() {
        let builder = FilterExpressionBuilder::default();
        assert!(builder
            .build_global_search(&columns(), &GlobalSearch::new("   "))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_predicate_order() {
        let builder = FilterExpressionBuilder::default();
        let predicate = builder
            .build_predicate(
                &columns(),
                &[FilterDescriptor::eq("id", json!(7))],
                &[FilterGroup::new(
                    LogicalOperator::And,
                    vec![FilterDescriptor::new("status", "ne", json!("X"))],
                )],
                Some(&GlobalSearch::new("q").in_columns(vec!["title".into()])),
            )
            .unwrap();
        assert_eq!(
            predicate.where_sql(),
            " WHERE \"id\" = ? AND (\"status\" <> ?) AND (UPPER(\"Title\") LIKE ?)"
        );
        assert_eq!(
            predicate.params(),
            &[SqlValue::from(7i64), SqlValue::from("X"), SqlValue::from("%Q%")]
        );
    }
}
