//! Schema Descriptor
//!
//! Turns a live database into a [`SchemaMap`] (table -> column set) for
//! validation and a textual rendering for generation context. Nothing here is
//! cached: every pipeline attempt describes the database again.

use crate::db::{render_row, Database, Row};
use crate::error::{PipelineError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Mapping of table name to its column names. Names are case-sensitive and
/// spelled exactly as the engine reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaMap {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl SchemaMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table<I, S>(&mut self, table: impl Into<String>, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables
            .entry(table.into())
            .or_default()
            .extend(columns.into_iter().map(Into::into));
    }

    pub fn with_table<I, S>(mut self, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_table(table, columns);
        self
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn columns(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.tables.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Flattened `table.column` pairs.
    pub fn qualified_columns(&self) -> BTreeSet<String> {
        self.tables
            .iter()
            .flat_map(|(table, cols)| cols.iter().map(move |c| format!("{}.{}", table, c)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type; empty when the column was declared without one
    pub decl_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub from: String,
    pub table: String,
    /// `None` when the reference targets the parent's primary key implicitly
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKey>,
    pub example_row: Option<Row>,
}

/// Everything introspected from a database in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDescription {
    pub tables: Vec<TableInfo>,
}

impl SchemaDescription {
    pub fn schema_map(&self) -> SchemaMap {
        let mut map = SchemaMap::new();
        for table in &self.tables {
            map.insert_table(table.name.clone(), table.columns.iter().map(|c| c.name.clone()));
        }
        map
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, table) in self.tables.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "TABLE {}", table.name)?;
            for col in &table.columns {
                write!(f, "  {}", col.name)?;
                if !col.decl_type.is_empty() {
                    write!(f, " {}", col.decl_type)?;
                }
                if col.primary_key {
                    write!(f, " PRIMARY KEY")?;
                } else if col.not_null {
                    write!(f, " NOT NULL")?;
                }
                writeln!(f)?;
            }
            for fk in &table.foreign_keys {
                match &fk.to {
                    Some(to) => writeln!(
                        f,
                        "  FOREIGN KEY ({}) REFERENCES {}({})",
                        fk.from, fk.table, to
                    )?,
                    None => writeln!(f, "  FOREIGN KEY ({}) REFERENCES {}", fk.from, fk.table)?,
                }
            }
            if let Some(row) = &table.example_row {
                writeln!(f, "  -- example: {}", render_row(row))?;
            }
        }
        Ok(())
    }
}

/// Map and rendering taken from the same introspection pass.
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    pub map: SchemaMap,
    pub text: String,
}

pub struct SchemaDescriptor;

impl SchemaDescriptor {
    /// Introspect `db`. Any failure here is `SchemaUnavailable`, which is fatal
    /// to a pipeline run.
    pub fn describe(db: &dyn Database) -> Result<SchemaSnapshot> {
        let description = db
            .describe_schema()
            .map_err(|e| PipelineError::SchemaUnavailable(e.to_string()))?;

        Ok(SchemaSnapshot {
            map: description.schema_map(),
            text: description.render(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;

    fn albums() -> TableInfo {
        TableInfo {
            name: "albums".to_string(),
            columns: vec![
                ColumnInfo {
                    name: "id".to_string(),
                    decl_type: "INTEGER".to_string(),
                    not_null: false,
                    primary_key: true,
                },
                ColumnInfo {
                    name: "artist_id".to_string(),
                    decl_type: "INTEGER".to_string(),
                    not_null: true,
                    primary_key: false,
                },
                ColumnInfo {
                    name: "note".to_string(),
                    decl_type: String::new(),
                    not_null: false,
                    primary_key: false,
                },
            ],
            foreign_keys: vec![ForeignKey {
                from: "artist_id".to_string(),
                table: "artists".to_string(),
                to: Some("id".to_string()),
            }],
            example_row: Some(vec![Value::Integer(1), Value::Integer(2), Value::Null]),
        }
    }

    #[test]
    fn test_render_lists_keys_and_example() {
        let description = SchemaDescription { tables: vec![albums()] };
        let text = description.render();

        assert!(text.starts_with("TABLE albums\n"));
        assert!(text.contains("  id INTEGER PRIMARY KEY\n"));
        assert!(text.contains("  artist_id INTEGER NOT NULL\n"));
        assert!(text.contains("  note\n"));
        assert!(text.contains("  FOREIGN KEY (artist_id) REFERENCES artists(id)\n"));
        assert!(text.contains("  -- example: (1, 2, NULL)\n"));
    }

    #[test]
    fn test_render_omits_missing_example() {
        let mut table = albums();
        table.example_row = None;
        let text = SchemaDescription { tables: vec![table] }.render();
        assert!(!text.contains("example"));
    }

    #[test]
    fn test_schema_map_flattening() {
        let map = SchemaDescription { tables: vec![albums()] }.schema_map();
        assert!(map.contains_table("albums"));
        assert!(!map.contains_table("Albums"));

        let qualified = map.qualified_columns();
        assert!(qualified.contains("albums.artist_id"));
        assert!(qualified.contains("albums.note"));
        assert_eq!(qualified.len(), 3);
    }
}
