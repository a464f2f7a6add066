//! # Mutation Gateway
//!
//! The only code that assembles a [`WriteBatch`], and therefore the only
//! path to the store's write executor. Every write is authorized, shape
//! checked, resolved against visible metadata, and wrapped in audit records
//! (requested, then executed or failed).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info};

use super::operation::CrudOperation;
use super::request::{ColumnValue, MutationRequest, MutationResult};
use crate::audit::{deliver, AuditContext, AuditLog, AuditRecord};
use crate::auth::{Authorizer, Capability, Principal};
use crate::errors::{CrudError, CrudResult};
use crate::filter::{FilterDescriptor, FilterExpressionBuilder};
use crate::metrics::EngineMetrics;
use crate::schema::{SchemaMetadataResolver, TableColumns};
use crate::sql::{placeholders, quote_identifier, quote_table};
use crate::store::{ExecOutcome, SqlStore, SqlValue, Statement, WriteBatch};
use crate::stream::normalize;

/// Column values and filters of one row to write
#[derive(Debug, Clone, Copy)]
pub struct RowChange<'a> {
    pub columns: &'a [ColumnValue],
    pub filters: &'a [FilterDescriptor],
}

/// Executes validated writes
pub struct MutationGateway {
    resolver: Arc<SchemaMetadataResolver>,
    filters: FilterExpressionBuilder,
    store: Arc<dyn SqlStore>,
    authorizer: Arc<dyn Authorizer>,
    audit: Arc<dyn AuditLog>,
    metrics: Arc<EngineMetrics>,
}

impl MutationGateway {
    pub fn new(
        resolver: Arc<SchemaMetadataResolver>,
        filters: FilterExpressionBuilder,
        store: Arc<dyn SqlStore>,
        authorizer: Arc<dyn Authorizer>,
        audit: Arc<dyn AuditLog>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            resolver,
            filters,
            store,
            authorizer,
            audit,
            metrics,
        }
    }

    /// Execute one CREATE, UPDATE or DELETE
    pub fn execute(
        &self,
        principal: &Principal,
        request: &MutationRequest,
    ) -> CrudResult<MutationResult> {
        self.authorizer
            .authorize(principal, Capability::WriteTable)?;

        let context = AuditContext::from_principal(principal, request.reason.clone());
        let change = RowChange {
            columns: &request.columns,
            filters: &request.filters,
        };

        let prepared = self
            .resolver
            .resolve(&request.table)
            .and_then(|columns| {
                let statement = self.build_statement(&columns, request.operation, change)?;
                Ok((columns, statement))
            });

        let (columns, statement) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.reject(&context, &request.table, request.operation, 1, &e);
                return Err(e);
            }
        };

        let outcomes = self.run(&context, columns.table(), request.operation, vec![statement])?;
        let outcome = outcomes.into_iter().next().unwrap_or_default();

        Ok(MutationResult {
            affected_rows: outcome.affected_rows,
            generated_id: match request.operation {
                CrudOperation::Create => outcome.generated_id.map(|id| normalize(id, None)),
                CrudOperation::Read | CrudOperation::Update | CrudOperation::Delete => None,
            },
        })
    }

    /// Execute several rows as one atomic batch under a shared audit context.
    ///
    /// Callers authorize and pre-validate; shape errors here still fail closed.
    pub(crate) fn execute_rows(
        &self,
        context: &AuditContext,
        table: &str,
        operation: CrudOperation,
        rows: &[RowChange<'_>],
    ) -> CrudResult<u64> {
        let prepared = self.resolver.resolve(table).and_then(|columns| {
            let statements = rows
                .iter()
                .map(|row| self.build_statement(&columns, operation, *row))
                .collect::<CrudResult<Vec<_>>>()?;
            Ok((columns, statements))
        });

        let (columns, statements) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.reject(context, table, operation, rows.len(), &e);
                return Err(e);
            }
        };

        let outcomes = self.run(context, columns.table(), operation, statements)?;
        Ok(outcomes.iter().map(|o| o.affected_rows).sum())
    }

    /// Validate the operation shape and build its statement
    fn build_statement(
        &self,
        columns: &TableColumns,
        operation: CrudOperation,
        change: RowChange<'_>,
    ) -> CrudResult<Statement> {
        if operation.requires_columns() && change.columns.is_empty() {
            return Err(CrudError::ValidationFailed(format!(
                "{} requires at least one column",
                operation
            )));
        }
        if operation.requires_filters() && change.filters.is_empty() {
            return Err(CrudError::InvalidFilter(format!(
                "{} requires at least one filter",
                operation
            )));
        }

        let table = quote_table(columns.table());
        let (names, mut params) = if operation.requires_columns() {
            self.resolve_values(columns, change.columns)?
        } else {
            (Vec::new(), Vec::new())
        };

        let sql = match operation {
            CrudOperation::Create => format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                names.join(", "),
                placeholders(names.len())
            ),
            CrudOperation::Update => {
                let predicate =
                    self.filters
                        .build_predicate(columns, change.filters, &[], None)?;
                let assignments = names
                    .iter()
                    .map(|n| format!("{} = ?", n))
                    .collect::<Vec<_>>()
                    .join(", ");
                params.extend_from_slice(predicate.params());
                format!("UPDATE {} SET {}{}", table, assignments, predicate.where_sql())
            }
            CrudOperation::Delete => {
                let predicate =
                    self.filters
                        .build_predicate(columns, change.filters, &[], None)?;
                params.extend_from_slice(predicate.params());
                format!("DELETE FROM {}{}", table, predicate.where_sql())
            }
            CrudOperation::Read => {
                return Err(CrudError::ValidationFailed(format!(
                    "{} is not a mutation; use the query path",
                    operation
                )))
            }
        };

        Ok(Statement {
            operation,
            sql,
            params,
        })
    }

    /// Quoted column names and bound values, rejecting duplicates
    fn resolve_values(
        &self,
        columns: &TableColumns,
        values: &[ColumnValue],
    ) -> CrudResult<(Vec<String>, Vec<SqlValue>)> {
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(values.len());
        let mut params = Vec::with_capacity(values.len());

        for value in values {
            let column = self.filters.resolve_column(columns, &value.name)?;
            if !seen.insert(column.name.to_lowercase()) {
                return Err(CrudError::ValidationFailed(format!(
                    "column '{}' specified more than once",
                    column.name
                )));
            }
            let bound = SqlValue::from_json(&value.value).ok_or_else(|| {
                CrudError::ValidationFailed(format!(
                    "value for column '{}' must be a scalar",
                    column.name
                ))
            })?;
            names.push(quote_identifier(&column.name));
            params.push(bound);
        }

        Ok((names, params))
    }

    /// Execute statements with audit records around the store call
    fn run(
        &self,
        context: &AuditContext,
        table: &str,
        operation: CrudOperation,
        statements: Vec<Statement>,
    ) -> CrudResult<Vec<ExecOutcome>> {
        let rows = statements.len();
        deliver(
            self.audit.as_ref(),
            &AuditRecord::requested(context)
                .with_target(table, operation)
                .with_rows(rows),
        );

        for statement in &statements {
            debug!(trace_id = %context.trace_id, sql = %statement.sql, "Prepared write");
        }

        let batch = WriteBatch::new(context.trace_id, statements);
        match self.store.execute_batch(&batch) {
            Ok(outcomes) => {
                let affected: u64 = outcomes.iter().map(|o| o.affected_rows).sum();
                self.metrics.increment_mutations_executed();
                deliver(
                    self.audit.as_ref(),
                    &AuditRecord::executed(context, affected)
                        .with_target(table, operation)
                        .with_rows(rows),
                );
                info!(
                    trace_id = %context.trace_id,
                    actor = %context.actor,
                    table,
                    operation = %operation,
                    rows,
                    affected,
                    "Mutation executed"
                );
                Ok(outcomes)
            }
            Err(e) => {
                self.metrics.increment_mutations_failed();
                error!(
                    trace_id = %context.trace_id,
                    table,
                    operation = %operation,
                    error = %e,
                    "Mutation failed"
                );
                let err = CrudError::execution(format!("executing {} on '{}'", operation, table), e);
                deliver(
                    self.audit.as_ref(),
                    &AuditRecord::failed(context, err.kind())
                        .with_target(table, operation)
                        .with_rows(rows),
                );
                Err(err)
            }
        }
    }

    fn reject(
        &self,
        context: &AuditContext,
        table: &str,
        operation: CrudOperation,
        rows: usize,
        err: &CrudError,
    ) {
        debug!(trace_id = %context.trace_id, table, error = %err, "Mutation rejected");
        deliver(
            self.audit.as_ref(),
            &AuditRecord::rejected(context, err.kind())
                .with_target(table, operation)
                .with_rows(rows),
        );
    }
}
