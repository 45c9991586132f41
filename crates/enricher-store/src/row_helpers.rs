use serde_json::{Map, Value};

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a JSON column, returning CorruptRow on parse failure.
pub fn parse_json(raw: &str, table: &'static str, column: &'static str) -> Result<Value, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

/// Parse a JSON column that must hold an object.
pub fn parse_object(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<Map<String, Value>, StoreError> {
    match parse_json(raw, table, column)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::CorruptRow {
            table,
            column,
            detail: format!("expected object, got {other}"),
        }),
    }
}
