//! Positional SQL values.
//!
//! User input arrives as JSON and is converted here before binding. Rows
//! coming back from a cursor use the same representation, with the temporal
//! variants reserved for drivers that report typed date/time values.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A value bound to a `?` placeholder or read from a cursor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl SqlValue {
    /// Convert a scalar JSON value.
    ///
    /// Returns `None` for arrays and objects, which never bind to a single
    /// placeholder.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(SqlValue::Null),
            Value::Bool(b) => Some(SqlValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(SqlValue::Integer(i))
                } else {
                    n.as_f64().map(SqlValue::Real)
                }
            }
            Value::String(s) => Some(SqlValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Integer(i)
    }
}

impl From<u64> for SqlValue {
    fn from(i: u64) -> Self {
        SqlValue::Integer(i64::try_from(i).unwrap_or(i64::MAX))
    }
}
