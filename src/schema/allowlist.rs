//! # Allow-list and Sensitive Columns
//!
//! Both sets are built once from configuration and never mutated. Table
//! names are matched case-insensitively; the canonical (configured) spelling
//! is the only one ever written into SQL text.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::ConfigError;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$#]*(\.[A-Za-z_][A-Za-z0-9_$#]*)?$")
            .expect("identifier pattern is valid")
    })
}

/// Check that a configured table name is a plain (optionally schema-qualified) identifier
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

/// Immutable set of tables the engine may touch
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    /// lowercase name -> canonical name
    tables: BTreeMap<String, String>,
}

impl AllowList {
    /// Build from configured names, rejecting anything that is not an identifier
    pub fn new<I, S>(tables: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = BTreeMap::new();
        for table in tables {
            let table = table.as_ref().trim();
            if !is_valid_identifier(table) {
                return Err(ConfigError::InvalidTableName(table.to_string()));
            }
            map.insert(table.to_lowercase(), table.to_string());
        }
        Ok(Self { tables: map })
    }

    /// Canonical name of an allowed table
    pub fn canonical(&self, table: &str) -> Option<&str> {
        self.tables
            .get(&table.trim().to_lowercase())
            .map(String::as_str)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.canonical(table).is_some()
    }

    /// Allowed tables, sorted
    pub fn tables(&self) -> Vec<String> {
        self.tables.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Column names and patterns that are never surfaced
#[derive(Debug, Clone, Default)]
pub struct SensitiveColumns {
    /// Uppercase exact names
    names: HashSet<String>,
    patterns: Vec<Regex>,
}

impl SensitiveColumns {
    pub fn new<I, S>(names: I, patterns: &[String]) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_uppercase())
            .filter(|n| !n.is_empty())
            .collect();

        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){}", p))
                    .map_err(|e| ConfigError::InvalidPattern(p.clone(), e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { names, patterns })
    }

    /// Check whether a column name is sensitive
    pub fn is_sensitive(&self, column: &str) -> bool {
        let upper = column.trim().to_uppercase();
        self.names.contains(&upper) || self.patterns.iter().any(|p| p.is_match(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_is_case_insensitive() {
        let list = AllowList::new(["audit_sessions", "Audit_Login_Attempts"]).unwrap();
        assert_eq!(list.canonical("AUDIT_SESSIONS"), Some("audit_sessions"));
        assert_eq!(
            list.canonical("audit_login_attempts"),
            Some("Audit_Login_Attempts")
        );
        assert!(!list.contains("users"));
        assert_eq!(list.tables(), vec!["Audit_Login_Attempts", "audit_sessions"]);
    }

    #[test]
    fn test_allow_list_rejects_non_identifiers() {
        assert!(AllowList::new(["users; DROP TABLE x"]).is_err());
        assert!(AllowList::new(["\"quoted\""]).is_err());
        assert!(AllowList::new(["app.users"]).is_ok());
    }

    #[test]
    fn test_sensitive_names_and_patterns() {
        let sensitive =
            SensitiveColumns::new(["PASSWORD", "api_key"], &["_secret$".to_string()]).unwrap();
        assert!(sensitive.is_sensitive("password"));
        assert!(sensitive.is_sensitive("API_KEY"));
        assert!(sensitive.is_sensitive("client_SECRET"));
        assert!(!sensitive.is_sensitive("password_hint"));
        assert!(!sensitive.is_sensitive("username"));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = SensitiveColumns::new(Vec::<String>::new(), &["(".to_string()]);
        assert!(matches!(result, Err(ConfigError::InvalidPattern(_, _))));
    }
}
