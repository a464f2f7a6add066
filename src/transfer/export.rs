//! Export writers.

use std::io::{self, BufWriter, Write};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::request::{ExportFormat, ExportRequest};
use crate::errors::{CrudError, CrudResult};
use crate::stream::{Record, RecordStream};

/// Result type for exports
pub type TransferResult<T> = Result<T, TransferError>;

/// Export failures: the read itself, or the destination
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Crud(#[from] CrudError),

    #[error("Export write failed: {0}")]
    Io(#[from] io::Error),

    #[error("Export write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Export write failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransferError {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Crud(e) => e.code(),
            TransferError::Io(_) | TransferError::Csv(_) | TransferError::Json(_) => "IO_ERROR",
        }
    }
}

/// What an export wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub file_name: String,
    pub format: ExportFormat,
    pub columns: Vec<String>,
    pub rows: u64,
}

/// Write every row of `stream` to `writer` in the request's format.
///
/// Rows are written as they are read. On error the rows already written
/// stay written and the stream is released.
pub fn write_export<W: Write>(
    mut stream: RecordStream,
    request: &ExportRequest,
    writer: W,
) -> TransferResult<ExportSummary> {
    let columns = select_columns(stream.columns(), &request.columns)?;

    let rows = match request.format {
        ExportFormat::Csv => write_csv(&mut stream, &columns, request.include_headers, writer)?,
        ExportFormat::Json => write_json(&mut stream, &columns, writer)?,
        ExportFormat::Jsonl => write_jsonl(&mut stream, &columns, writer)?,
    };

    Ok(ExportSummary {
        file_name: request.file_name(),
        format: request.format,
        columns,
        rows,
    })
}

/// Requested columns in catalog spelling; every streamed column when none
fn select_columns(available: &[String], requested: &[String]) -> CrudResult<Vec<String>> {
    if requested.is_empty() {
        return Ok(available.to_vec());
    }

    requested
        .iter()
        .map(|name| {
            available
                .iter()
                .find(|column| column.eq_ignore_ascii_case(name.trim()))
                .cloned()
                .ok_or_else(|| CrudError::ColumnNotAllowed(name.clone()))
        })
        .collect()
}

fn project(record: &Record, columns: &[String]) -> Record {
    columns
        .iter()
        .map(|c| (c.clone(), record.get(c).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// NULL is an empty cell; strings are written raw
fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn write_csv<W: Write>(
    stream: &mut RecordStream,
    columns: &[String],
    include_headers: bool,
    writer: W,
) -> TransferResult<u64> {
    let mut out = csv::Writer::from_writer(writer);
    if include_headers {
        out.write_record(columns)?;
    }

    let mut rows = 0;
    for record in stream.by_ref() {
        let record = record?;
        out.write_record(columns.iter().map(|c| csv_cell(record.get(c))))?;
        rows += 1;
    }
    out.flush()?;
    Ok(rows)
}

fn write_json<W: Write>(
    stream: &mut RecordStream,
    columns: &[String],
    writer: W,
) -> TransferResult<u64> {
    let mut out = BufWriter::new(writer);
    out.write_all(b"[")?;

    let mut rows = 0;
    for record in stream.by_ref() {
        let record = record?;
        let separator: &[u8] = if rows == 0 { b"\n" } else { b",\n" };
        out.write_all(separator)?;
        serde_json::to_writer(&mut out, &project(&record, columns))?;
        rows += 1;
    }

    let close: &[u8] = if rows == 0 { b"]\n" } else { b"\n]\n" };
    out.write_all(close)?;
    out.flush()?;
    Ok(rows)
}

fn write_jsonl<W: Write>(
    stream: &mut RecordStream,
    columns: &[String],
    writer: W,
) -> TransferResult<u64> {
    let mut out = BufWriter::new(writer);

    let mut rows = 0;
    for record in stream.by_ref() {
        let record = record?;
        serde_json::to_writer(&mut out, &project(&record, columns))?;
        out.write_all(b"\n")?;
        rows += 1;
    }
    out.flush()?;
    Ok(rows)
}
