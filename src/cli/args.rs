//! CLI argument definitions using clap
//!
//! Commands:
//! - tablecrud tables
//! - tablecrud schema --table <name>
//! - tablecrud query | stream | mutate | bulk | import | export   (request JSON on stdin)

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::auth::Principal;

/// Dynamic CRUD and bulk operations over allow-listed tables
#[derive(Parser, Debug)]
#[command(name = "tablecrud")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./tablecrud.json")]
    pub config: PathBuf,

    /// Actor name recorded in audit records
    #[arg(long, default_value = "cli")]
    pub actor: String,

    /// Authority granted to the actor (repeatable)
    #[arg(long = "role")]
    pub roles: Vec<String>,

    /// Client origin recorded in audit records
    #[arg(long)]
    pub origin: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List allow-listed tables
    Tables,

    /// Describe the visible columns of a table
    Schema {
        #[arg(long)]
        table: String,
    },

    /// Run a paged query (QueryRequest on stdin)
    Query,

    /// Stream every matching row as JSON lines (QueryRequest on stdin)
    Stream,

    /// Run a single CREATE, UPDATE or DELETE (MutationRequest on stdin)
    Mutate,

    /// Run a bulk operation (BulkRequest on stdin)
    Bulk,

    /// Load a CSV or JSON document (ImportRequest on stdin)
    Import,

    /// Write matching rows as CSV, JSON or JSON lines (ExportRequest on stdin)
    Export,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Principal for this invocation
    pub fn principal(&self) -> Principal {
        let mut principal = Principal::authenticated(self.actor.clone());
        principal.authorities = self.roles.clone();
        principal.client_origin = Some(self.origin.clone().unwrap_or_else(|| "cli".to_string()));
        principal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schema_command() {
        let cli = Cli::try_parse_from([
            "tablecrud",
            "--config",
            "crud.json",
            "--actor",
            "ops",
            "--role",
            "ROLE_ADMIN",
            "--role",
            "ROLE_AUDITOR",
            "schema",
            "--table",
            "orders",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("crud.json"));
        assert_eq!(
            cli.command,
            Command::Schema {
                table: "orders".to_string()
            }
        );
        let principal = cli.principal();
        assert_eq!(principal.name, "ops");
        assert!(principal.has_authority("ROLE_AUDITOR"));
        assert_eq!(principal.client_origin.as_deref(), Some("cli"));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["tablecrud", "bulk"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("./tablecrud.json"));
        assert!(cli.roles.is_empty());
        assert_eq!(cli.command, Command::Bulk);
    }

    #[test]
    fn test_parse_transfer_commands() {
        let import = Cli::try_parse_from(["tablecrud", "--role", "ROLE_ADMIN", "import"]).unwrap();
        assert_eq!(import.command, Command::Import);
        let export = Cli::try_parse_from(["tablecrud", "export"]).unwrap();
        assert_eq!(export.command, Command::Export);
    }
}
