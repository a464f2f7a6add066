//! Document parsing for imports.

use serde_json::Value;
use uuid::Uuid;

use super::request::{ImportFormat, ImportRequest};
use crate::bulk::{BulkRequest, BulkRow};
use crate::errors::{CrudError, CrudResult};
use crate::mutation::ColumnValue;

/// Source field names and values of one document row
type Fields = Vec<(String, Value)>;

/// Parse the request's document into bulk rows with mapped column names.
///
/// Rows carry no filters. Values are not checked here; the bulk
/// orchestrator validates every row before anything runs.
pub fn parse_rows(request: &ImportRequest) -> CrudResult<Vec<BulkRow>> {
    if request.data.trim().is_empty() {
        return Err(CrudError::ValidationFailed(
            "Import data is required".to_string(),
        ));
    }

    let documents = match request.format {
        ImportFormat::Csv => parse_csv(&request.data)?,
        ImportFormat::Json => parse_json(&request.data)?,
    };

    Ok(documents
        .into_iter()
        .map(|fields| {
            let columns = fields
                .into_iter()
                .map(|(source, value)| ColumnValue::new(request.mapped_name(&source), value))
                .collect();
            BulkRow::new(columns, Vec::new())
        })
        .collect())
}

/// Bulk request equivalent to `request`
pub fn to_bulk_request(request: &ImportRequest) -> CrudResult<BulkRequest> {
    let rows = parse_rows(request)?;
    let metadata = request
        .metadata
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("import_{}_{}", request.format.as_str(), Uuid::new_v4()));

    let mut bulk = BulkRequest::new(&request.table, request.operation, rows).metadata(metadata);
    bulk.batch_size = request.batch_size;
    bulk.dry_run = request.dry_run;
    bulk.skip_on_error = request.skip_on_error;
    Ok(bulk)
}

fn invalid_csv(err: csv::Error) -> CrudError {
    CrudError::ValidationFailed(format!("Invalid CSV data: {}", err))
}

/// Header row names the fields. Empty cells are NULL; short rows only
/// carry the fields they have.
fn parse_csv(data: &str) -> CrudResult<Vec<Fields>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data.as_bytes());
    let headers = reader.headers().map_err(invalid_csv)?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(invalid_csv)?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let fields = headers
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (name.to_string(), value)
            })
            .collect();
        rows.push(fields);
    }
    Ok(rows)
}

/// Top level must be an array of objects
fn parse_json(data: &str) -> CrudResult<Vec<Fields>> {
    let root: Value = serde_json::from_str(data)
        .map_err(|e| CrudError::ValidationFailed(format!("Invalid JSON data: {}", e)))?;
    let Value::Array(items) = root else {
        return Err(CrudError::ValidationFailed(
            "JSON data must be an array of objects".to_string(),
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => Ok(map.into_iter().collect()),
            _ => Err(CrudError::ValidationFailed(format!(
                "JSON item {} is not an object",
                index + 1
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::mutation::CrudOperation;
    use serde_json::json;

    fn names(row: &BulkRow) -> Vec<&str> {
        row.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_csv_quoting_and_nulls() {
        let data = "sku, title ,price\r\nA-1,\"Anvil, large\",10.5\n\nB-2,\"Say \"\"hi\"\"\",\n";
        let request = ImportRequest::new("products", ImportFormat::Csv, data);
        let rows = parse_rows(&request).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(names(&rows[0]), vec!["sku", "title", "price"]);
        assert_eq!(rows[0].columns[1].value, json!("Anvil, large"));
        assert_eq!(rows[0].columns[2].value, json!("10.5"));
        assert_eq!(rows[1].columns[1].value, json!("Say \"hi\""));
        assert_eq!(rows[1].columns[2].value, json!(null));
        assert!(rows.iter().all(|r| r.filters.is_empty()));
    }

    #[test]
    fn test_csv_short_row_and_mapping() {
        let data = "Code,Name,Price\nA-1,Anvil\n";
        let request = ImportRequest::new("products", ImportFormat::Csv, data)
            .map_column("Code", "sku")
            .map_column("Name", "title");
        let rows = parse_rows(&request).unwrap();
        assert_eq!(names(&rows[0]), vec!["sku", "title"]);
    }

    #[test]
    fn test_json_rows_keep_value_types() {
        let data = r#"[{"sku": "A-1", "price": 10.5, "tags": ["x"]}, {"sku": null}]"#;
        let request = ImportRequest::new("products", ImportFormat::Json, data)
            .map_column("sku", "code");
        let rows = parse_rows(&request).unwrap();

        assert_eq!(rows.len(), 2);
        let first: Vec<_> = rows[0]
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.value.clone()))
            .collect();
        assert!(first.contains(&("price", json!(10.5))));
        assert!(first.contains(&("tags", json!(["x"]))));
        assert!(first.contains(&("code", json!("A-1"))));
        assert_eq!(rows[1].columns[0].value, json!(null));
    }

    #[test]
    fn test_malformed_documents() {
        let cases = [
            (ImportFormat::Json, r#"{"sku": "A-1"}"#, "array of objects"),
            (ImportFormat::Json, r#"[{"sku": "A-1"}, 7]"#, "item 2"),
            (ImportFormat::Json, "[{", "Invalid JSON"),
            (ImportFormat::Csv, "  \n ", "required"),
        ];
        for (format, data, expected) in cases {
            let err = parse_rows(&ImportRequest::new("products", format, data)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationFailed);
            assert!(err.to_string().contains(expected), "{}", err);
        }
    }

    #[test]
    fn test_bulk_request_carries_options() {
        let request = ImportRequest::new("products", ImportFormat::Csv, "sku\nA-1\n")
            .commit()
            .skip_on_error()
            .batch_size(50);
        let bulk = to_bulk_request(&request).unwrap();

        assert_eq!(bulk.table, "products");
        assert_eq!(bulk.operation, CrudOperation::Create);
        assert!(!bulk.dry_run);
        assert!(bulk.skip_on_error);
        assert_eq!(bulk.batch_size, Some(50));
        assert!(bulk.metadata.unwrap().starts_with("import_csv_"));

        let mut named = request.clone();
        named.metadata = Some("nightly load".to_string());
        assert_eq!(
            to_bulk_request(&named).unwrap().metadata.as_deref(),
            Some("nightly load")
        );
    }
}
