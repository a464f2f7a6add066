//! # Schema Metadata Resolver
//!
//! Single gate between a caller-supplied table name and the catalog. The
//! allow-list is checked before the catalog is consulted, and sensitive
//! columns are removed before metadata leaves this module. Every column
//! reference anywhere in the engine is resolved through [`TableColumns`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::allowlist::{AllowList, SensitiveColumns};
use super::types::ColumnMetadata;
use crate::errors::{CrudError, CrudResult};
use crate::store::Catalog;

/// Visible columns of one table with a case-insensitive lookup
#[derive(Debug, Clone)]
pub struct TableColumns {
    table: String,
    columns: Vec<ColumnMetadata>,
    by_name: HashMap<String, usize>,
}

impl TableColumns {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnMetadata>) -> Self {
        let by_name = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.to_lowercase(), i))
            .collect();
        Self {
            table: table.into(),
            columns,
            by_name,
        }
    }

    /// Canonical table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Visible columns in catalog order
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn lookup(&self, name: &str) -> Option<&ColumnMetadata> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .map(|&i| &self.columns[i])
    }

    /// Resolve a caller-supplied column name, failing closed
    pub fn resolve_column(&self, name: &str) -> CrudResult<&ColumnMetadata> {
        self.lookup(name).ok_or_else(|| {
            CrudError::ColumnNotAllowed(format!("'{}' on table '{}'", name, self.table))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn into_columns(self) -> Vec<ColumnMetadata> {
        self.columns
    }
}

/// Resolves column metadata for allow-listed tables
pub struct SchemaMetadataResolver {
    catalog: Option<Arc<dyn Catalog>>,
    allow_list: Arc<AllowList>,
    sensitive: Arc<SensitiveColumns>,
}

impl SchemaMetadataResolver {
    pub fn new(
        catalog: Option<Arc<dyn Catalog>>,
        allow_list: Arc<AllowList>,
        sensitive: Arc<SensitiveColumns>,
    ) -> Self {
        Self {
            catalog,
            allow_list,
            sensitive,
        }
    }

    /// Canonical name of an allowed table, or `TableNotAllowed`
    pub fn check_table(&self, table: &str) -> CrudResult<String> {
        self.allow_list
            .canonical(table)
            .map(str::to_string)
            .ok_or_else(|| CrudError::TableNotAllowed(table.to_string()))
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub fn is_sensitive(&self, column: &str) -> bool {
        self.sensitive.is_sensitive(column)
    }

    /// Visible columns of `table` in catalog ordinal order
    pub fn get_columns(&self, table: &str) -> CrudResult<Vec<ColumnMetadata>> {
        self.resolve(table).map(TableColumns::into_columns)
    }

    /// Visible columns of `table` with the lookup used for resolution
    pub fn resolve(&self, table: &str) -> CrudResult<TableColumns> {
        let canonical = self.check_table(table)?;

        let catalog = self.catalog.as_ref().ok_or_else(|| {
            CrudError::MetadataUnavailable("no catalog configured".to_string())
        })?;

        let all = catalog
            .table_columns(&canonical)
            .map_err(|e| CrudError::execution(format!("reading metadata for '{}'", canonical), e))?;

        if all.is_empty() {
            return Err(CrudError::MetadataUnavailable(format!(
                "no columns reported for '{}'",
                canonical
            )));
        }

        let total = all.len();
        let visible: Vec<ColumnMetadata> = all
            .into_iter()
            .filter(|c| !self.sensitive.is_sensitive(&c.name))
            .collect();

        debug!(
            table = %canonical,
            visible = visible.len(),
            hidden = total - visible.len(),
            "Resolved table metadata"
        );

        if visible.is_empty() {
            return Err(CrudError::MetadataUnavailable(format!(
                "no visible columns for '{}'",
                canonical
            )));
        }

        Ok(TableColumns::new(canonical, visible))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::store::StoreResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCatalog {
        calls: AtomicUsize,
    }

    impl Catalog for FixedCatalog {
        fn table_columns(&self, table: &str) -> StoreResult<Vec<ColumnMetadata>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if table != "accounts" {
                return Ok(Vec::new());
            }
            Ok(vec![
                ColumnMetadata::new("id", "INTEGER").primary(),
                ColumnMetadata::new("Email", "VARCHAR").with_length(120),
                ColumnMetadata::new("password_hash", "VARCHAR"),
                ColumnMetadata::new("status", "CHAR").with_length(1),
            ])
        }
    }

    fn resolver() -> (SchemaMetadataResolver, Arc<FixedCatalog>) {
        let catalog = Arc::new(FixedCatalog {
            calls: AtomicUsize::new(0),
        });
        let resolver = SchemaMetadataResolver::new(
            Some(catalog.clone()),
            Arc::new(AllowList::new(["accounts", "ghosts"]).unwrap()),
            Arc::new(SensitiveColumns::new(["PASSWORD_HASH"], &[]).unwrap()),
        );
        (resolver, catalog)
    }

    #[test]
    fn test_table_not_allowed_skips_catalog() {
        let (resolver, catalog) = resolver();
        let err = resolver.get_columns("payroll").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TableNotAllowed);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sensitive_columns_removed() {
        let (resolver, _) = resolver();
        let names: Vec<_> = resolver
            .get_columns("ACCOUNTS")
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["id", "Email", "status"]);
    }

    #[test]
    fn test_resolution_is_case_insensitive_and_fails_closed() {
        let (resolver, _) = resolver();
        let columns = resolver.resolve("accounts").unwrap();
        assert_eq!(columns.resolve_column("EMAIL").unwrap().name, "Email");
        assert_eq!(
            columns.resolve_column("password_hash").unwrap_err().kind(),
            ErrorKind::ColumnNotAllowed
        );
        assert_eq!(
            columns.resolve_column("nope").unwrap_err().kind(),
            ErrorKind::ColumnNotAllowed
        );
    }

    #[test]
    fn test_metadata_unavailable() {
        let (resolver, _) = resolver();
        assert_eq!(
            resolver.get_columns("ghosts").unwrap_err().kind(),
            ErrorKind::MetadataUnavailable
        );

        let no_catalog = SchemaMetadataResolver::new(
            None,
            Arc::new(AllowList::new(["accounts"]).unwrap()),
            Arc::new(SensitiveColumns::default()),
        );
        assert_eq!(
            no_catalog.get_columns("accounts").unwrap_err().kind(),
            ErrorKind::MetadataUnavailable
        );
    }

    #[test]
    fn test_repeated_resolution_is_stable() {
        let (resolver, catalog) = resolver();
        let first = resolver.get_columns("accounts").unwrap();
        let second = resolver.get_columns("accounts").unwrap();
        assert_eq!(first, second);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 2);
    }
}
