//! # CRUD Engine
//!
//! Facade wiring the resolver, builders, streaming executor, mutation
//! gateway and bulk orchestrator around one store. Every entry point
//! authorizes the principal first and checks the allow-list before any
//! catalog or store access.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info};

use crate::audit::{AuditLog, NoopAuditLog};
use crate::auth::{Authorizer, Capability, Principal, RoleAuthorizer};
use crate::bulk::{BulkOperationOrchestrator, BulkRequest, BulkResult};
use crate::config::{ConfigError, EngineConfig};
use crate::errors::{CrudError, CrudResult};
use crate::filter::FilterExpressionBuilder;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::mutation::{MutationGateway, MutationRequest, MutationResult};
use crate::query::{QueryBuilder, QueryRequest, QueryResult, SelectPlan};
use crate::schema::{SchemaMetadataResolver, TableColumns, TableSchema};
use crate::store::{Catalog, SqlStore, SqliteStore};
use crate::stream::{RecordStream, StreamOptions, StreamingExecutor, VisibleRowMapper};
use crate::transfer::{self, ExportRequest, ExportSummary, ImportRequest, TransferResult};

/// Builder for [`CrudEngine`]
pub struct EngineBuilder {
    config: EngineConfig,
    catalog: Option<Arc<dyn Catalog>>,
    store: Option<Arc<dyn SqlStore>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    audit: Option<Arc<dyn AuditLog>>,
    metrics: Option<Arc<EngineMetrics>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            catalog: None,
            store: None,
            authorizer: None,
            audit: None,
            metrics: None,
        }
    }

    pub fn catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn store(mut self, store: Arc<dyn SqlStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use one SQLite database as both catalog and store
    pub fn sqlite(self, store: Arc<SqliteStore>) -> Self {
        self.catalog(store.clone()).store(store)
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the configuration and wire the components
    pub fn build(self) -> Result<CrudEngine, ConfigError> {
        self.config.validate()?;
        let config = self.config;

        let store = self
            .store
            .ok_or_else(|| ConfigError::Invalid("no store configured".to_string()))?;
        let authorizer: Arc<dyn Authorizer> = match self.authorizer {
            Some(authorizer) => authorizer,
            None => Arc::new(RoleAuthorizer::new(config.required_authority.clone())),
        };
        let audit: Arc<dyn AuditLog> = match self.audit {
            Some(audit) => audit,
            None => Arc::new(NoopAuditLog),
        };
        let metrics = self.metrics.unwrap_or_default();

        let resolver = Arc::new(SchemaMetadataResolver::new(
            self.catalog,
            Arc::new(config.allow_list()?),
            Arc::new(config.sensitive()?),
        ));
        let filters = FilterExpressionBuilder::new(config.global_search_column_limit);

        let gateway = Arc::new(MutationGateway::new(
            resolver.clone(),
            filters,
            store.clone(),
            authorizer.clone(),
            audit,
            metrics.clone(),
        ));
        let bulk = BulkOperationOrchestrator::new(
            gateway.clone(),
            resolver.clone(),
            filters,
            authorizer.clone(),
            metrics.clone(),
        )
        .with_batch_limits(config.default_batch_size, config.max_batch_size);
        let streaming = StreamingExecutor::new(store.clone(), metrics.clone())
            .with_fetch_limits(config.stream_fetch_size, config.max_fetch_size);

        Ok(CrudEngine {
            config,
            resolver,
            queries: QueryBuilder::new(filters),
            store,
            streaming,
            gateway,
            bulk,
            authorizer,
            metrics,
        })
    }
}

/// Dynamic table CRUD engine
pub struct CrudEngine {
    config: EngineConfig,
    resolver: Arc<SchemaMetadataResolver>,
    queries: QueryBuilder,
    store: Arc<dyn SqlStore>,
    streaming: StreamingExecutor,
    gateway: Arc<MutationGateway>,
    bulk: BulkOperationOrchestrator,
    authorizer: Arc<dyn Authorizer>,
    metrics: Arc<EngineMetrics>,
}

impl CrudEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Allow-listed tables, sorted
    pub fn available_tables(&self) -> Vec<String> {
        self.resolver.allow_list().tables()
    }

    /// Visible column metadata of one table
    pub fn table_schema(&self, principal: &Principal, table: &str) -> CrudResult<TableSchema> {
        self.authorizer
            .authorize(principal, Capability::DescribeSchema)?;
        let columns = self.resolver.resolve(table)?;
        Ok(TableSchema {
            table: columns.table().to_string(),
            columns: columns.into_columns(),
        })
    }

    /// One page of rows plus the total count.
    ///
    /// A limit is required and capped at `max_page_size`; use [`stream`]
    /// for unbounded reads. Without `order_by` page contents are not stable
    /// across calls.
    ///
    /// [`stream`]: CrudEngine::stream
    pub fn select(&self, principal: &Principal, request: &QueryRequest) -> CrudResult<QueryResult> {
        self.tracked(|| {
            self.authorizer.authorize(principal, Capability::ReadTable)?;
            self.resolver.check_table(&request.table)?;

            let max = self.config.max_page_size;
            match request.limit {
                None => return Err(CrudError::UnboundedQuery(max)),
                Some(limit) if limit > max => return Err(CrudError::LimitExceeded(limit, max)),
                Some(_) => {}
            }

            let (columns, plan) = self.plan(request)?;
            let total_count = self.run_count(&plan)?;
            let rows = self
                .streaming
                .stream(
                    &plan.sql,
                    &plan.params,
                    VisibleRowMapper::new(&columns),
                    StreamOptions::named(format!("select:{}", columns.table())),
                )?
                .collect::<CrudResult<Vec<_>>>()?;

            Ok(QueryResult {
                rows,
                total_count,
                columns: columns.into_columns(),
            })
        })
    }

    /// Lazy stream of matching rows. The cursor is released when the stream
    /// is exhausted, closed, or dropped.
    pub fn stream(&self, principal: &Principal, request: &QueryRequest) -> CrudResult<RecordStream> {
        self.tracked(|| {
            self.authorizer.authorize(principal, Capability::ReadTable)?;
            let (columns, plan) = self.plan(request)?;
            self.streaming.stream(
                &plan.sql,
                &plan.params,
                VisibleRowMapper::new(&columns),
                StreamOptions::named(format!("stream:{}", columns.table())),
            )
        })
    }

    /// Number of rows matching the request's predicate, ignoring paging
    pub fn count(&self, principal: &Principal, request: &QueryRequest) -> CrudResult<u64> {
        self.tracked(|| {
            self.authorizer.authorize(principal, Capability::ReadTable)?;
            let (_, plan) = self.plan(request)?;
            self.run_count(&plan)
        })
    }

    /// Single-row CREATE, UPDATE or DELETE
    pub fn mutate(
        &self,
        principal: &Principal,
        request: &MutationRequest,
    ) -> CrudResult<MutationResult> {
        self.gateway.execute(principal, request)
    }

    /// Multi-row write with batching, dry run and partial-failure reporting
    pub fn bulk(&self, principal: &Principal, request: &BulkRequest) -> CrudResult<BulkResult> {
        self.bulk.execute_bulk_operation(principal, request)
    }

    /// Load a CSV or JSON document through the bulk path.
    ///
    /// Previews unless the request turns `dry_run` off.
    pub fn import(&self, principal: &Principal, request: &ImportRequest) -> CrudResult<BulkResult> {
        self.authorizer.authorize(principal, Capability::BulkWrite)?;
        self.resolver.check_table(&request.table)?;

        let bulk = transfer::to_bulk_request(request)?;
        info!(
            table = %request.table,
            format = request.format.as_str(),
            rows = bulk.rows.len(),
            dry_run = bulk.dry_run,
            "Starting import"
        );
        self.bulk(principal, &bulk)
    }

    /// Write every matching row to `writer` as CSV, JSON or JSON lines
    pub fn export<W: Write>(
        &self,
        principal: &Principal,
        request: &ExportRequest,
        writer: W,
    ) -> TransferResult<ExportSummary> {
        let stream = self.stream(principal, &request.query())?;
        let summary = transfer::write_export(stream, request, writer)?;
        info!(
            table = %request.table,
            format = request.format.extension(),
            rows = summary.rows,
            "Export complete"
        );
        Ok(summary)
    }

    fn plan(&self, request: &QueryRequest) -> CrudResult<(TableColumns, SelectPlan)> {
        let columns = self.resolver.resolve(&request.table)?;
        let plan = self
            .queries
            .build(&columns, request, self.store.paging_style())?;
        Ok((columns, plan))
    }

    fn run_count(&self, plan: &SelectPlan) -> CrudResult<u64> {
        self.store
            .count(&plan.count_sql, &plan.count_params)
            .map_err(|e| CrudError::execution("counting rows", e))
    }

    /// Count a read as executed or rejected
    fn tracked<T>(&self, f: impl FnOnce() -> CrudResult<T>) -> CrudResult<T> {
        let result = f();
        match &result {
            Ok(_) => self.metrics.increment_queries_executed(),
            Err(e) if e.is_structural() => {
                debug!(code = e.code(), error = %e, "Read rejected");
                self.metrics.increment_queries_rejected();
            }
            Err(_) => {}
        }
        result
    }
}
