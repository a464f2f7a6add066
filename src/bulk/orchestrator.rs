//! # Bulk Operation Orchestrator
//!
//! Validates every row before the store is touched, previews dry runs, and
//! executes the rest in fixed-size batches through the mutation gateway.
//!
//! Batches are independent units of work: a failed batch does not roll back
//! the ones already committed.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use super::request::{
    BulkRequest, BulkResult, BulkRow, BulkStatus, DryRunPreview, RowError, DEFAULT_BULK_REASON,
};
use crate::audit::AuditContext;
use crate::auth::{Authorizer, Capability, Principal};
use crate::errors::{CrudError, CrudResult, ErrorKind};
use crate::filter::FilterExpressionBuilder;
use crate::metrics::EngineMetrics;
use crate::mutation::{CrudOperation, MutationGateway, RowChange};
use crate::schema::{SchemaMetadataResolver, TableColumns};
use crate::store::SqlValue;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const MAX_BATCH_SIZE: usize = 1000;

/// Lifecycle of one batch
#[derive(Debug)]
enum BatchState {
    Pending,
    Executing,
    Committed { affected: u64 },
    Failed { error: CrudError },
}

/// Contiguous slice of request rows executed as one gateway call
struct Batch<'a> {
    /// 0-based index of the first row
    start: usize,
    rows: &'a [BulkRow],
    state: BatchState,
}

impl<'a> Batch<'a> {
    fn new(start: usize, rows: &'a [BulkRow]) -> Self {
        Self {
            start,
            rows,
            state: BatchState::Pending,
        }
    }

    fn begin(&mut self) {
        if matches!(self.state, BatchState::Pending) {
            self.state = BatchState::Executing;
        }
    }

    fn finish(&mut self, result: CrudResult<u64>) {
        if matches!(self.state, BatchState::Executing) {
            self.state = match result {
                Ok(affected) => BatchState::Committed { affected },
                Err(error) => BatchState::Failed { error },
            };
        }
    }

    fn last_row_number(&self) -> usize {
        self.start + self.rows.len()
    }
}

/// Running totals folded from finished batches
#[derive(Debug, Default)]
struct Accumulator {
    success: usize,
    failure: usize,
    processed: usize,
    affected: u64,
    errors: Vec<RowError>,
}

impl Accumulator {
    /// Fold a finished batch; returns false if the batch failed
    fn fold(&mut self, batch: &Batch<'_>) -> bool {
        match &batch.state {
            BatchState::Committed { affected } => {
                self.success += batch.rows.len();
                self.processed += batch.rows.len();
                self.affected += affected;
                true
            }
            BatchState::Failed { error } => {
                self.failure += batch.rows.len();
                self.processed += batch.rows.len();
                let message = format!("Batch error: {}", error);
                self.errors.extend((0..batch.rows.len()).map(|offset| {
                    RowError::new(
                        batch.start + offset + 1,
                        message.clone(),
                        ErrorKind::ExecutionError,
                    )
                }));
                false
            }
            BatchState::Pending | BatchState::Executing => false,
        }
    }

    fn status(&self) -> BulkStatus {
        if self.failure == 0 {
            BulkStatus::Success
        } else if self.success == 0 {
            BulkStatus::Failure
        } else {
            BulkStatus::PartialSuccess
        }
    }
}

/// Runs multi-row requests
pub struct BulkOperationOrchestrator {
    gateway: Arc<MutationGateway>,
    resolver: Arc<SchemaMetadataResolver>,
    filters: FilterExpressionBuilder,
    authorizer: Arc<dyn Authorizer>,
    metrics: Arc<EngineMetrics>,
    default_batch_size: usize,
    max_batch_size: usize,
}

impl BulkOperationOrchestrator {
    pub fn new(
        gateway: Arc<MutationGateway>,
        resolver: Arc<SchemaMetadataResolver>,
        filters: FilterExpressionBuilder,
        authorizer: Arc<dyn Authorizer>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            gateway,
            resolver,
            filters,
            authorizer,
            metrics,
            default_batch_size: DEFAULT_BATCH_SIZE,
            max_batch_size: MAX_BATCH_SIZE,
        }
    }

    pub fn with_batch_limits(mut self, default_batch_size: usize, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self.default_batch_size = default_batch_size.clamp(1, self.max_batch_size);
        self
    }

    /// Validate, preview or execute a bulk request.
    ///
    /// Request-level problems (access, shape, allow-list, metadata) return
    /// `Err`. Row validation errors and failed batches are reported in the
    /// result.
    pub fn execute_bulk_operation(
        &self,
        principal: &Principal,
        request: &BulkRequest,
    ) -> CrudResult<BulkResult> {
        let started = Instant::now();
        self.authorizer.authorize(principal, Capability::BulkWrite)?;

        let batch_size = self.validate_request(request)?;
        let columns = self.resolver.resolve(&request.table)?;
        let total = request.rows.len();

        info!(
            "Starting bulk {} operation on table '{}' with {} rows, batch size: {}",
            request.operation,
            columns.table(),
            total,
            batch_size
        );

        let validation_errors = self.validate_rows(&columns, request);

        if request.dry_run {
            let preview = dry_run_preview(columns.table(), request, &validation_errors);
            return Ok(BulkResult {
                total_rows: total,
                success_count: 0,
                failure_count: validation_errors.len(),
                processed_rows: 0,
                affected_rows: 0,
                status: BulkStatus::DryRunPreview,
                errors: validation_errors,
                duration_ms: elapsed_ms(started),
                dry_run_preview: Some(preview),
                trace_id: None,
            });
        }

        if !validation_errors.is_empty() {
            info!(
                "Bulk {} on table '{}' rejected: {} validation errors",
                request.operation,
                columns.table(),
                validation_errors.len()
            );
            return Ok(BulkResult {
                total_rows: total,
                success_count: 0,
                failure_count: validation_errors.len(),
                processed_rows: 0,
                affected_rows: 0,
                status: BulkStatus::ValidationFailed,
                errors: validation_errors,
                duration_ms: elapsed_ms(started),
                dry_run_preview: None,
                trace_id: None,
            });
        }

        let reason = request
            .metadata
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BULK_REASON.to_string());
        let context = AuditContext::from_principal(principal, Some(reason));
        let accumulator = self.run_batches(&context, columns.table(), request, batch_size);

        let duration_ms = elapsed_ms(started);
        info!(
            "Bulk operation completed: {} rows processed in {} ms. Success: {}, Failures: {}",
            accumulator.processed, duration_ms, accumulator.success, accumulator.failure
        );

        Ok(BulkResult {
            total_rows: total,
            success_count: accumulator.success,
            failure_count: accumulator.failure,
            processed_rows: accumulator.processed,
            affected_rows: accumulator.affected,
            status: accumulator.status(),
            errors: accumulator.errors,
            duration_ms,
            dry_run_preview: None,
            trace_id: Some(context.trace_id),
        })
    }

    /// Shape checks; returns the effective batch size
    fn validate_request(&self, request: &BulkRequest) -> CrudResult<usize> {
        if request.table.trim().is_empty() {
            return Err(CrudError::ValidationFailed("table is required".to_string()));
        }
        if !request.operation.is_write() {
            return Err(CrudError::ValidationFailed(format!(
                "unsupported bulk operation: {}",
                request.operation
            )));
        }
        if request.rows.is_empty() {
            return Err(CrudError::ValidationFailed(
                "at least one row is required".to_string(),
            ));
        }

        let batch_size = request.batch_size.unwrap_or(self.default_batch_size);
        if batch_size == 0 || batch_size > self.max_batch_size {
            return Err(CrudError::ValidationFailed(format!(
                "batch size must be between 1 and {}",
                self.max_batch_size
            )));
        }

        self.resolver.check_table(&request.table)?;
        Ok(batch_size)
    }

    /// Collect every row problem without touching the store
    fn validate_rows(&self, columns: &TableColumns, request: &BulkRequest) -> Vec<RowError> {
        let operation = request.operation;
        let mut errors = Vec::new();

        for (index, row) in request.rows.iter().enumerate() {
            let row_number = index + 1;

            if row.columns.is_empty() && operation.requires_columns() {
                errors.push(RowError::new(
                    row_number,
                    "No columns provided for row",
                    ErrorKind::ValidationFailed,
                ));
            }

            let mut seen = HashSet::new();
            for column in &row.columns {
                let name = column.name.trim();
                if name.is_empty() {
                    errors.push(RowError::new(
                        row_number,
                        "Column name is blank",
                        ErrorKind::ValidationFailed,
                    ));
                } else if self.resolver.is_sensitive(name) {
                    errors.push(RowError::new(
                        row_number,
                        format!("Cannot modify sensitive column: {}", name),
                        ErrorKind::ColumnNotAllowed,
                    ));
                } else if !columns.contains(name) {
                    errors.push(RowError::new(
                        row_number,
                        format!("Unknown column: {}", name),
                        ErrorKind::ColumnNotAllowed,
                    ));
                } else if !seen.insert(name.to_lowercase()) {
                    errors.push(RowError::new(
                        row_number,
                        format!("Column specified more than once: {}", name),
                        ErrorKind::ValidationFailed,
                    ));
                } else if SqlValue::from_json(&column.value).is_none() {
                    errors.push(RowError::new(
                        row_number,
                        format!("Value for column '{}' must be a scalar", name),
                        ErrorKind::ValidationFailed,
                    ));
                }
            }

            if operation.requires_filters() && row.filters.is_empty() {
                errors.push(RowError::new(
                    row_number,
                    format!("WHERE clause required for {}", operation),
                    ErrorKind::InvalidFilter,
                ));
            }

            for filter in &row.filters {
                if let Err(e) = self.filters.build_filter_clause(columns, filter) {
                    errors.push(RowError::new(row_number, e.to_string(), e.kind()));
                }
            }
        }

        errors
    }

    fn run_batches(
        &self,
        context: &AuditContext,
        table: &str,
        request: &BulkRequest,
        batch_size: usize,
    ) -> Accumulator {
        let total = request.rows.len();
        let mut accumulator = Accumulator::default();

        for (i, rows) in request.rows.chunks(batch_size).enumerate() {
            let mut batch = Batch::new(i * batch_size, rows);
            batch.begin();

            let changes: Vec<RowChange<'_>> = rows
                .iter()
                .map(|row| RowChange {
                    columns: &row.columns,
                    filters: &row.filters,
                })
                .collect();
            let result = self
                .gateway
                .execute_rows(context, table, request.operation, &changes);
            batch.finish(result);

            if let BatchState::Failed { error } = &batch.state {
                error!(
                    trace_id = %context.trace_id,
                    error = %error,
                    "Error processing batch [{}-{}] on table '{}'",
                    batch.start,
                    batch.last_row_number() - 1,
                    table
                );
            }

            let committed = accumulator.fold(&batch);
            if committed {
                self.metrics.increment_batches_committed();
                debug!(
                    "Bulk progress on table '{}': {}/{} rows",
                    table, accumulator.processed, total
                );
            } else {
                self.metrics.increment_batches_failed();
                if !request.skip_on_error {
                    break;
                }
            }
        }

        accumulator
    }
}

fn dry_run_preview(table: &str, request: &BulkRequest, errors: &[RowError]) -> DryRunPreview {
    let total = request.rows.len();
    let invalid_rows: BTreeSet<usize> = errors.iter().map(|e| e.row_number).collect();
    let estimated = total.saturating_sub(invalid_rows.len());

    let mut warnings = Vec::new();
    if !errors.is_empty() {
        warnings.push(format!("{} validation errors detected", errors.len()));
    }
    if request.operation == CrudOperation::Delete {
        warnings.push(format!(
            "DELETE removes rows permanently; each filter may match more than one row in '{}'",
            table
        ));
    }

    DryRunPreview {
        estimated_affected_rows: estimated,
        execution_plan: format!(
            "Execute bulk {} on table '{}': {} rows will be processed, ~{} rows estimated to be affected",
            request.operation, table, total, estimated
        ),
        validation_warnings: warnings,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
