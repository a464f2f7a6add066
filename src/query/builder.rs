//! # Query Builder
//!
//! Assembles a SELECT and its companion COUNT from one predicate. The
//! projection is always explicit so redacted columns cannot leak through
//! `*`.

use tracing::debug;

use super::request::QueryRequest;
use crate::errors::CrudResult;
use crate::filter::{FilterExpressionBuilder, Predicate};
use crate::schema::TableColumns;
use crate::sql::{quote_identifier, quote_table};
use crate::store::{PagingStyle, SqlValue};

/// Statements for one read
#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub count_sql: String,
    pub count_params: Vec<SqlValue>,
    /// Projection in order
    pub visible_columns: Vec<String>,
}

/// Builds read statements
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder {
    filters: FilterExpressionBuilder,
}

impl QueryBuilder {
    pub fn new(filters: FilterExpressionBuilder) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &FilterExpressionBuilder {
        &self.filters
    }

    /// Build the SELECT and COUNT for `request`
    pub fn build(
        &self,
        columns: &TableColumns,
        request: &QueryRequest,
        paging: PagingStyle,
    ) -> CrudResult<SelectPlan> {
        let predicate = self.filters.build_predicate(
            columns,
            &request.filters,
            &request.filter_groups,
            request.global_search.as_ref(),
        )?;

        let visible_columns: Vec<String> =
            columns.columns().iter().map(|c| c.name.clone()).collect();
        let projection = visible_columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let table = quote_table(columns.table());
        let where_sql = predicate.where_sql();

        let mut sql = format!("SELECT {} FROM {}{}", projection, table, where_sql);
        let mut params = predicate.params().to_vec();

        if let Some(order_by) = &request.order_by {
            let column = self.filters.resolve_column(columns, order_by)?;
            let direction = request.order_direction.unwrap_or_default();
            sql.push_str(&format!(
                " ORDER BY {} {}",
                quote_identifier(&column.name),
                direction.as_sql()
            ));
        }

        if let Some(limit) = request.limit {
            let offset = request.offset.unwrap_or(0);
            match paging {
                PagingStyle::OffsetFetch => {
                    sql.push_str(" OFFSET ? ROWS FETCH NEXT ? ROWS ONLY");
                    params.push(SqlValue::from(offset));
                    params.push(SqlValue::from(limit));
                }
                PagingStyle::LimitOffset => {
                    sql.push_str(" LIMIT ? OFFSET ?");
                    params.push(SqlValue::from(limit));
                    params.push(SqlValue::from(offset));
                }
            }
        }

        let (count_sql, count_params) = count_statement(&table, &predicate);

        debug!(table = columns.table(), sql = %sql, params = params.len(), "Built select");

        Ok(SelectPlan {
            sql,
            params,
            count_sql,
            count_params,
            visible_columns,
        })
    }
}

fn count_statement(table: &str, predicate: &Predicate) -> (String, Vec<SqlValue>) {
    (
        format!("SELECT COUNT(*) FROM {}{}", table, predicate.where_sql()),
        predicate.params().to_vec(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::filter::{FilterDescriptor, GlobalSearch};
    use crate::query::OrderDirection;
    use crate::schema::ColumnMetadata;
    use serde_json::json;

    fn columns() -> TableColumns {
        TableColumns::new(
            "orders",
            vec![
                ColumnMetadata::new("id", "INTEGER").primary(),
                ColumnMetadata::new("customer", "VARCHAR"),
                ColumnMetadata::new("total", "NUMERIC"),
            ],
        )
    }

    #[test]
    fn test_explicit_projection_without_paging() {
        let plan = QueryBuilder::default()
            .build(&columns(), &QueryRequest::new("orders"), PagingStyle::OffsetFetch)
            .unwrap();
        assert_eq!(
            plan.sql,
            "SELECT \"id\", \"customer\", \"total\" FROM \"orders\""
        );
        assert!(plan.params.is_empty());
        assert_eq!(plan.count_sql, "SELECT COUNT(*) FROM \"orders\"");
        assert_eq!(plan.visible_columns, vec!["id", "customer", "total"]);
    }

    #[test]
    fn test_offset_fetch_paging() {
        let request = QueryRequest::new("orders")
            .filter(FilterDescriptor::new("total", ">", json!(10)))
            .order("ID", OrderDirection::Desc)
            .page(20, 40);
        let plan = QueryBuilder::default()
            .build(&columns(), &request, PagingStyle::OffsetFetch)
            .unwrap();
        assert_eq!(
            plan.sql,
            "SELECT \"id\", \"customer\", \"total\" FROM \"orders\" WHERE \"total\" > ? \
             ORDER BY \"id\" DESC OFFSET ? ROWS FETCH NEXT ? ROWS ONLY"
        );
        assert_eq!(
            plan.params,
            vec![SqlValue::from(10i64), SqlValue::from(40u64), SqlValue::from(20u64)]
        );
        assert_eq!(plan.count_sql, "SELECT COUNT(*) FROM \"orders\" WHERE \"total\" > ?");
        assert_eq!(plan.count_params, vec![SqlValue::from(10i64)]);
    }

    #[test]
    fn test_limit_offset_paging_defaults_offset() {
        let mut request = QueryRequest::new("orders");
        request.limit = Some(5);
        let plan = QueryBuilder::default()
            .build(&columns(), &request, PagingStyle::LimitOffset)
            .unwrap();
        assert!(plan.sql.ends_with(" LIMIT ? OFFSET ?"));
        assert_eq!(plan.params, vec![SqlValue::from(5u64), SqlValue::from(0u64)]);
    }

    #[test]
    fn test_count_shares_search_predicate() {
        let request = QueryRequest::new("orders")
            .search(GlobalSearch::new("acme"))
            .page(10, 0);
        let plan = QueryBuilder::default()
            .build(&columns(), &request, PagingStyle::LimitOffset)
            .unwrap();
        assert_eq!(
            plan.count_sql,
            "SELECT COUNT(*) FROM \"orders\" WHERE (UPPER(\"customer\") LIKE ?)"
        );
        assert_eq!(plan.count_params, vec![SqlValue::from("%ACME%")]);
        assert_eq!(&plan.params[..1], &plan.count_params[..]);
    }

    #[test]
    fn test_unknown_order_column() {
        let request = QueryRequest::new("orders").order("created_at", OrderDirection::Asc);
        let err = QueryBuilder::default()
            .build(&columns(), &request, PagingStyle::LimitOffset)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNotAllowed);
    }
}
