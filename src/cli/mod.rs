//! Command-line front end
//!
//! - tables: list allow-listed tables
//! - schema: describe visible columns
//! - query / stream: read rows (request JSON on stdin)
//! - mutate / bulk: write rows (request JSON on stdin)

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{boot, run, run_command, CliConfig};
pub use errors::{CliError, CliResult};
pub use io::{read_request, read_request_from, write_error, write_line, write_response};
