//! Database module
//!
//! The pipeline talks to the relational engine only through the [`Database`]
//! trait. [`SqliteDatabase`] is the production handle; it opens a fresh
//! read-only connection for every operation.

pub mod demo;
pub mod schema;
pub mod sqlite;

pub use rusqlite::types::Value;
pub use schema::{SchemaDescription, SchemaDescriptor, SchemaMap, SchemaSnapshot};
pub use sqlite::SqliteDatabase;

use crate::error::DbError;
use itertools::Itertools;

/// One result tuple, in column order.
pub type Row = Vec<Value>;

/// Ordered result tuples of a query.
pub type Rows = Vec<Row>;

/// Handle to a database the pipeline can introspect and query.
///
/// All calls are synchronous and raise on failure.
pub trait Database {
    /// Full introspection: tables, columns, keys and best-effort example rows.
    fn describe_schema(&self) -> Result<SchemaDescription, DbError>;

    fn list_tables_and_columns(&self) -> Result<SchemaMap, DbError> {
        Ok(self.describe_schema()?.schema_map())
    }

    fn execute(&self, sql: &str) -> Result<Rows, DbError>;

    /// Plan-only check; must not return or materialize result rows.
    fn dry_run_check(&self, sql: &str) -> Result<(), DbError>;
}

/// Render a single value the way SQL literals read.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

/// Plain text of a value, without literal quoting.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => render_value(other),
    }
}

/// Render a row as a tuple, e.g. `(1, 'Intro', 120)`.
pub fn render_row(row: &[Value]) -> String {
    format!("({})", row.iter().map(render_value).join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_row() {
        let row = vec![
            Value::Integer(1),
            Value::Text("It's".to_string()),
            Value::Null,
            Value::Real(2.5),
        ];
        assert_eq!(render_row(&row), "(1, 'It''s', NULL, 2.5)");
    }
}
