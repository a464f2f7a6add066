//! SQL text helpers.
//!
//! Only identifiers that already passed the allow-list or column resolution
//! reach these functions. Values never do.

/// Quote a single identifier, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name part by part
pub fn quote_table(name: &str) -> String {
    name.split('.')
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// `?, ?, ?` for `count` positional parameters
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
