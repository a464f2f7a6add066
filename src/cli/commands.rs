//! CLI command implementations
//!
//! Boot sequence: load config, install logging, open the database and the
//! audit sink, build the engine, then run exactly one command.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::audit::{AuditLog, FileAuditLog, NoopAuditLog};
use crate::auth::Principal;
use crate::bulk::BulkRequest;
use crate::config::{ConfigError, EngineConfig};
use crate::engine::CrudEngine;
use crate::logging::{self, LogFormat};
use crate::mutation::MutationRequest;
use crate::query::QueryRequest;
use crate::store::SqliteStore;
use crate::transfer::{ExportRequest, ImportRequest};

use super::args::{Cli, Command};
use super::errors::CliResult;
use super::io::{read_request, write_error, write_line, write_response};

/// Configuration file structure: engine settings plus process wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// SQLite database file (required)
    pub database_path: PathBuf,

    /// Append-only JSON-lines audit file. No audit trail when absent.
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(flatten)]
    pub engine: EngineConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CliConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::Read)?;
        let config: CliConfig = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
        config.engine.validate()?;
        Ok(config)
    }
}

/// Parse arguments, boot and run one command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let config = CliConfig::load(&cli.config)?;
    logging::init(config.log_format, &config.log_level);

    let engine = boot(&config)?;
    let principal = cli.principal();

    match run_command(&engine, &principal, &cli.command) {
        Ok(()) => Ok(()),
        Err(e) => {
            write_error(e.code(), &e.to_string())?;
            Err(e)
        }
    }
}

/// Open the store and audit sink and build the engine
pub fn boot(config: &CliConfig) -> CliResult<CrudEngine> {
    let store = Arc::new(SqliteStore::open(&config.database_path)?);
    let audit: Arc<dyn AuditLog> = match &config.audit_log_path {
        Some(path) => Arc::new(FileAuditLog::open(path)?),
        None => Arc::new(NoopAuditLog),
    };

    let engine = CrudEngine::builder(config.engine.clone())
        .sqlite(store)
        .audit_log(audit)
        .build()?;

    info!(
        database = %config.database_path.display(),
        tables = engine.available_tables().len(),
        "Engine ready"
    );
    Ok(engine)
}

/// Run a single command against a booted engine
pub fn run_command(engine: &CrudEngine, principal: &Principal, command: &Command) -> CliResult<()> {
    match command {
        Command::Tables => write_response(&json!({ "tables": engine.available_tables() })),
        Command::Schema { table } => write_response(&engine.table_schema(principal, table)?),
        Command::Query => {
            let request: QueryRequest = read_request()?;
            write_response(&engine.select(principal, &request)?)
        }
        Command::Stream => {
            let request: QueryRequest = read_request()?;
            stream(engine, principal, &request)
        }
        Command::Mutate => {
            let request: MutationRequest = read_request()?;
            write_response(&engine.mutate(principal, &request)?)
        }
        Command::Bulk => {
            let request: BulkRequest = read_request()?;
            write_response(&engine.bulk(principal, &request)?)
        }
        Command::Import => {
            let request: ImportRequest = read_request()?;
            write_response(&engine.import(principal, &request)?)
        }
        Command::Export => {
            let request: ExportRequest = read_request()?;
            engine.export(principal, &request, io::stdout().lock())?;
            Ok(())
        }
    }
}

/// Write one JSON line per row. An error mid-stream ends the output with
/// an error envelope; rows already written stay written.
fn stream(engine: &CrudEngine, principal: &Principal, request: &QueryRequest) -> CliResult<()> {
    let mut rows = engine.stream(principal, request)?;
    for row in rows.by_ref() {
        write_line(&row?)?;
    }
    info!(rows = rows.rows_read(), table = %request.table, "Stream complete");
    Ok(())
}
