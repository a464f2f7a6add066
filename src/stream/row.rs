//! Row mapping for streamed results.
//!
//! Values are normalized to JSON: temporal values to RFC 3339 / ISO-8601
//! text, blobs to base64, non-finite reals to null.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

use crate::errors::CrudResult;
use crate::schema::{TableColumns, TemporalKind};
use crate::store::{RawRow, SqlValue};

/// A mapped row: column name to JSON value, in projection order
pub type Record = serde_json::Map<String, Value>;

/// Converts a raw cursor row into the caller's row type
pub trait RowMapper: Send {
    type Output;

    fn map_row(&self, columns: &[String], row: RawRow) -> CrudResult<Self::Output>;
}

/// Maps rows to [`Record`]s, dropping any column outside the visible set
#[derive(Debug, Clone)]
pub struct VisibleRowMapper {
    /// lowercase name -> (catalog name, temporal family)
    visible: HashMap<String, (String, Option<TemporalKind>)>,
}

impl VisibleRowMapper {
    pub fn new(columns: &TableColumns) -> Self {
        let visible = columns
            .columns()
            .iter()
            .map(|c| (c.name.to_lowercase(), (c.name.clone(), c.temporal_kind())))
            .collect();
        Self { visible }
    }
}

impl RowMapper for VisibleRowMapper {
    type Output = Record;

    fn map_row(&self, columns: &[String], row: RawRow) -> CrudResult<Record> {
        let mut record = Record::new();
        for (label, value) in columns.iter().zip(row) {
            if let Some((name, kind)) = self.visible.get(&label.to_lowercase()) {
                record.insert(name.clone(), normalize(value, *kind));
            }
        }
        Ok(record)
    }
}

/// Convert a store value to JSON
pub fn normalize(value: SqlValue, kind: Option<TemporalKind>) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(b),
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        SqlValue::Text(s) => match kind {
            Some(kind) => Value::String(normalize_temporal_text(&s, kind).unwrap_or(s)),
            None => Value::String(s),
        },
        SqlValue::Blob(bytes) => Value::String(STANDARD.encode(bytes)),
        SqlValue::Timestamp(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        SqlValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
    }
}

/// Temporal values stored as text are rewritten when they parse
fn normalize_temporal_text(text: &str, kind: TemporalKind) -> Option<String> {
    let text = text.trim();
    match kind {
        TemporalKind::Timestamp => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
                return Some(
                    ts.with_timezone(&Utc)
                        .to_rfc3339_opts(SecondsFormat::AutoSi, true),
                );
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|naive| {
                    naive
                        .and_utc()
                        .to_rfc3339_opts(SecondsFormat::AutoSi, true)
                })
        }
        TemporalKind::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(|d| d.format("%Y-%m-%d").to_string()),
        TemporalKind::Time => NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
            .ok()
            .map(|t| t.format("%H:%M:%S%.f").to_string()),
    }
}
