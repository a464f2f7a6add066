//! JSON I/O handling for CLI
//!
//! - Input: one JSON request via stdin
//! - Output: one JSON object via stdout, or one object per line for streams
//! - UTF-8 only

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::errors::{CliError, CliResult};

/// Read a JSON request from `reader`
pub fn read_request_from<T: DeserializeOwned>(mut reader: impl Read) -> CliResult<T> {
    let mut input = String::new();
    reader.read_to_string(&mut input)?;

    if input.trim().is_empty() {
        return Err(CliError::EmptyInput);
    }

    Ok(serde_json::from_str(&input)?)
}

/// Read a JSON request from stdin
pub fn read_request<T: DeserializeOwned>() -> CliResult<T> {
    read_request_from(io::stdin().lock())
}

/// Write a success response
pub fn write_response(data: &impl Serialize) -> CliResult<()> {
    let response = json!({
        "status": "ok",
        "data": data
    });
    write_line(&response)
}

/// Write an error response
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_line(&response)
}

/// Write one JSON value followed by a newline
pub fn write_line(value: &impl Serialize) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Build the error envelope without writing it
pub fn error_envelope(code: &str, message: &str) -> Value {
    json!({
        "status": "error",
        "code": code,
        "message": message
    })
}
