//! # Mutation Audit
//!
//! - Every mutation attempt is recorded before execution
//! - Every outcome (executed, failed, rejected) is recorded after
//! - Records are handed to an [`AuditLog`] collaborator; delivery failures
//!   are logged and never fail the mutation
//!
//! Two sinks are provided: an in-memory log for tests and an append-only
//! JSON-lines file.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::auth::Principal;
use crate::errors::ErrorKind;
use crate::mutation::CrudOperation;

/// Who is mutating, and why. Forwarded to the audit sink, never stored by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditContext {
    pub actor: String,
    pub trace_id: Uuid,
    pub client_origin: Option<String>,
    pub reason: Option<String>,
}

impl AuditContext {
    /// Context for `principal` with a fresh trace id
    pub fn from_principal(principal: &Principal, reason: Option<String>) -> Self {
        Self {
            actor: principal.name.clone(),
            trace_id: Uuid::new_v4(),
            client_origin: principal.client_origin.clone(),
            reason: reason.filter(|r| !r.trim().is_empty()),
        }
    }
}

/// Audit action type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Mutation accepted and about to run
    Requested,
    /// Statements committed
    Executed,
    /// Store rejected the statements
    Failed,
    /// Refused before reaching the store
    Rejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Requested => "REQUESTED",
            AuditAction::Executed => "EXECUTED",
            AuditAction::Failed => "FAILED",
            AuditAction::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Pending,
    Success,
    Failed,
    Rejected,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Pending => "PENDING",
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::Failed => "FAILED",
            AuditOutcome::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub trace_id: Uuid,
    pub actor: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<CrudOperation>,

    /// Rows submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl AuditRecord {
    pub fn new(action: AuditAction, outcome: AuditOutcome, context: &AuditContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            outcome,
            trace_id: context.trace_id,
            actor: context.actor.clone(),
            origin: context.client_origin.clone(),
            reason: context.reason.clone(),
            table: None,
            operation: None,
            row_count: None,
            affected_rows: None,
            error_kind: None,
        }
    }

    /// Mutation accepted
    pub fn requested(context: &AuditContext) -> Self {
        Self::new(AuditAction::Requested, AuditOutcome::Pending, context)
    }

    /// Mutation committed
    pub fn executed(context: &AuditContext, affected_rows: u64) -> Self {
        Self::new(AuditAction::Executed, AuditOutcome::Success, context).with_affected(affected_rows)
    }

    /// Mutation failed in the store
    pub fn failed(context: &AuditContext, kind: ErrorKind) -> Self {
        Self::new(AuditAction::Failed, AuditOutcome::Failed, context).with_error(kind)
    }

    /// Mutation refused before execution
    pub fn rejected(context: &AuditContext, kind: ErrorKind) -> Self {
        Self::new(AuditAction::Rejected, AuditOutcome::Rejected, context).with_error(kind)
    }

    pub fn with_target(mut self, table: impl Into<String>, operation: CrudOperation) -> Self {
        self.table = Some(table.into());
        self.operation = Some(operation);
        self
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.row_count = Some(rows);
        self
    }

    pub fn with_affected(mut self, affected_rows: u64) -> Self {
        self.affected_rows = Some(affected_rows);
        self
    }

    pub fn with_error(mut self, kind: ErrorKind) -> Self {
        self.error_kind = Some(kind);
        self
    }

    /// Serialize to one JSON line
    pub fn to_json(&self) -> io::Result<String> {
        serde_json::to_string(self).map_err(io::Error::from)
    }
}

/// Audit collaborator
pub trait AuditLog: Send + Sync {
    /// Append a record. The record is visible once this returns `Ok`.
    fn append(&self, record: &AuditRecord) -> io::Result<()>;
}

/// Hand a record to the sink, logging instead of propagating failures
pub fn deliver(log: &dyn AuditLog, record: &AuditRecord) {
    if let Err(e) = log.append(record) {
        warn!(
            trace_id = %record.trace_id,
            action = %record.action,
            error = %e,
            "Audit delivery failed"
        );
    }
}

/// Append-only JSON-lines audit file
pub struct FileAuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditLog {
    /// Open or create an audit log file
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for FileAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let line = record.to_json()?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audit writer poisoned"))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        writer.get_ref().sync_data()
    }
}

/// In-memory audit log
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditLog {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded entries, oldest first
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        self.records
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audit buffer poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditLog;

impl AuditLog for NoopAuditLog {
    fn append(&self, _record: &AuditRecord) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct BrokenLog;

    impl AuditLog for BrokenLog {
        fn append(&self, _record: &AuditRecord) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink offline"))
        }
    }

    fn context() -> AuditContext {
        AuditContext::from_principal(
            &Principal::authenticated("ops").with_origin("10.0.0.5"),
            Some("nightly cleanup".to_string()),
        )
    }

    #[test]
    fn test_record_carries_context() {
        let ctx = context();
        let record = AuditRecord::executed(&ctx, 3).with_target("orders", CrudOperation::Update);
        assert_eq!(record.trace_id, ctx.trace_id);
        assert_eq!(record.actor, "ops");
        assert_eq!(record.origin.as_deref(), Some("10.0.0.5"));
        assert_eq!(record.affected_rows, Some(3));
        assert_eq!(record.outcome, AuditOutcome::Success);
    }

    #[test]
    fn test_blank_reason_dropped() {
        let ctx = AuditContext::from_principal(&Principal::authenticated("a"), Some("  ".into()));
        assert!(ctx.reason.is_none());
    }

    #[test]
    fn test_record_json() {
        let record = AuditRecord::failed(&context(), ErrorKind::ExecutionError)
            .with_target("orders", CrudOperation::Delete);
        let json = record.to_json().unwrap();
        assert!(json.contains("\"action\":\"FAILED\""));
        assert!(json.contains("\"errorKind\":\"EXECUTION_ERROR\""));
        assert!(json.contains("\"operation\":\"DELETE\""));
        assert!(!json.contains("affectedRows"));
    }

    #[test]
    fn test_file_audit_log_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let ctx = context();

        {
            let log = FileAuditLog::open(&path).unwrap();
            log.append(&AuditRecord::requested(&ctx)).unwrap();
            log.append(&AuditRecord::executed(&ctx, 1)).unwrap();
        }
        {
            let log = FileAuditLog::open(&path).unwrap();
            log.append(&AuditRecord::requested(&ctx)).unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        let records: Vec<AuditRecord> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].action, AuditAction::Executed);
        assert!(records.iter().all(|r| r.trace_id == ctx.trace_id));
    }

    #[test]
    fn test_delivery_failure_is_swallowed() {
        deliver(&BrokenLog, &AuditRecord::requested(&context()));
    }

    #[test]
    fn test_memory_log() {
        let log = MemoryAuditLog::new();
        assert!(log.is_empty());
        log.append(&AuditRecord::requested(&context())).unwrap();
        assert_eq!(log.len(), 1);
    }
}
