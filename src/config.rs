//! # Engine Configuration
//!
//! Loaded once at startup from a JSON file (or built in code) and immutable
//! afterwards. Every field except `allowed_tables` has a default.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::ROLE_ADMIN;
use crate::bulk::{DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
use crate::schema::{
    is_valid_identifier, AllowList, SensitiveColumns, DEFAULT_GLOBAL_SEARCH_COLUMN_LIMIT,
};
use crate::stream::{DEFAULT_FETCH_SIZE, MAX_FETCH_SIZE};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid table name in allow-list: '{0}'")]
    InvalidTableName(String),

    #[error("Invalid sensitive column pattern '{0}': {1}")]
    InvalidPattern(String, String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Default page size cap for materialized reads
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 1000;

/// Column names never surfaced, compared case-insensitively
pub const DEFAULT_SENSITIVE_COLUMNS: [&str; 8] = [
    "PASSWORD",
    "PASSWORD_HASH",
    "SECRET",
    "SECRET_KEY",
    "ACCESS_KEY",
    "API_KEY",
    "TOKEN",
    "REFRESH_TOKEN",
];

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tables reachable through the engine (required)
    pub allowed_tables: Vec<String>,

    #[serde(default = "default_sensitive_columns")]
    pub sensitive_columns: Vec<String>,

    /// Regex patterns matched case-insensitively against column names
    #[serde(default)]
    pub sensitive_column_patterns: Vec<String>,

    #[serde(default = "default_required_authority")]
    pub required_authority: String,

    #[serde(default = "default_search_column_limit")]
    pub global_search_column_limit: usize,

    #[serde(default = "default_fetch_size")]
    pub stream_fetch_size: usize,

    #[serde(default = "default_max_fetch_size")]
    pub max_fetch_size: usize,

    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

fn default_sensitive_columns() -> Vec<String> {
    DEFAULT_SENSITIVE_COLUMNS.iter().map(|s| s.to_string()).collect()
}
fn default_required_authority() -> String {
    ROLE_ADMIN.to_string()
}
fn default_search_column_limit() -> usize {
    DEFAULT_GLOBAL_SEARCH_COLUMN_LIMIT
}
fn default_fetch_size() -> usize {
    DEFAULT_FETCH_SIZE
}
fn default_max_fetch_size() -> usize {
    MAX_FETCH_SIZE
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_max_batch_size() -> usize {
    MAX_BATCH_SIZE
}
fn default_max_page_size() -> u64 {
    DEFAULT_MAX_PAGE_SIZE
}

impl EngineConfig {
    /// Defaults with the given allow-list
    pub fn new<I, S>(allowed_tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_tables: allowed_tables.into_iter().map(Into::into).collect(),
            sensitive_columns: default_sensitive_columns(),
            sensitive_column_patterns: Vec::new(),
            required_authority: default_required_authority(),
            global_search_column_limit: default_search_column_limit(),
            stream_fetch_size: default_fetch_size(),
            max_fetch_size: default_max_fetch_size(),
            default_batch_size: default_batch_size(),
            max_batch_size: default_max_batch_size(),
            max_page_size: default_max_page_size(),
        }
    }

    /// Load and validate configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_tables.is_empty() {
            return Err(ConfigError::Invalid(
                "allowed_tables must name at least one table".to_string(),
            ));
        }
        if let Some(bad) = self
            .allowed_tables
            .iter()
            .find(|t| !is_valid_identifier(t.trim()))
        {
            return Err(ConfigError::InvalidTableName(bad.clone()));
        }

        if self.required_authority.trim().is_empty() {
            return Err(ConfigError::Invalid("required_authority must not be blank".to_string()));
        }
        if self.global_search_column_limit == 0 {
            return Err(ConfigError::Invalid("global_search_column_limit must be > 0".to_string()));
        }
        if self.max_fetch_size == 0 || self.stream_fetch_size == 0 {
            return Err(ConfigError::Invalid("fetch sizes must be > 0".to_string()));
        }
        if self.stream_fetch_size > self.max_fetch_size {
            return Err(ConfigError::Invalid(format!(
                "stream_fetch_size {} exceeds max_fetch_size {}",
                self.stream_fetch_size, self.max_fetch_size
            )));
        }
        if self.max_batch_size == 0 || self.default_batch_size == 0 {
            return Err(ConfigError::Invalid("batch sizes must be > 0".to_string()));
        }
        if self.default_batch_size > self.max_batch_size {
            return Err(ConfigError::Invalid(format!(
                "default_batch_size {} exceeds max_batch_size {}",
                self.default_batch_size, self.max_batch_size
            )));
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::Invalid("max_page_size must be > 0".to_string()));
        }

        // Compile patterns now so a bad one fails at startup
        self.sensitive()?;
        Ok(())
    }

    pub fn allow_list(&self) -> Result<AllowList, ConfigError> {
        AllowList::new(&self.allowed_tables)
    }

    pub fn sensitive(&self) -> Result<SensitiveColumns, ConfigError> {
        SensitiveColumns::new(&self.sensitive_columns, &self.sensitive_column_patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_applied() {
        let config = EngineConfig::from_json_str(r#"{"allowed_tables": ["orders"]}"#).unwrap();
        assert_eq!(config.required_authority, "ROLE_ADMIN");
        assert_eq!(config.global_search_column_limit, 8);
        assert_eq!(config.stream_fetch_size, 250);
        assert_eq!(config.max_fetch_size, 1000);
        assert_eq!(config.default_batch_size, 100);
        assert_eq!(config.max_batch_size, 1000);
        assert_eq!(config.max_page_size, 1000);
        assert_eq!(config.sensitive_columns.len(), 8);
        assert_eq!(config, EngineConfig::new(["orders"]));
    }

    #[test]
    fn test_missing_allow_list_rejected() {
        assert!(matches!(
            EngineConfig::from_json_str("{}"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"allowed_tables": []}"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_bad_identifiers_and_patterns() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"allowed_tables": ["orders--"]}"#),
            Err(ConfigError::InvalidTableName(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(
                r#"{"allowed_tables": ["orders"], "sensitive_column_patterns": ["[a-"]}"#
            ),
            Err(ConfigError::InvalidPattern(_, _))
        ));
    }

    #[test]
    fn test_size_relationships() {
        let mut config = EngineConfig::new(["orders"]);
        config.default_batch_size = 2000;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::new(["orders"]);
        config.stream_fetch_size = 5000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"allowed_tables": ["orders", "audit_sessions"], "required_authority": "ROLE_OPS"}}"#
        )
        .unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.allowed_tables.len(), 2);
        assert_eq!(config.required_authority, "ROLE_OPS");
    }
}
