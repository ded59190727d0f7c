//! SQLite database handle
//!
//! Connections are scoped per operation (acquired, used, dropped) so nothing
//! opened during one pipeline attempt survives into the next. Every connection
//! is opened read-only.

use crate::db::schema::{ColumnInfo, ForeignKey, SchemaDescription, TableInfo};
use crate::db::{Database, Rows, Value};
use crate::error::DbError;
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    path: PathBuf,
}

impl SqliteDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, DbError> {
        if !self.path.is_file() {
            return Err(DbError::Unavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }

        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DbError::Unavailable(format!("{}: {}", self.path.display(), e)))
    }

    fn table_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn table_info(conn: &Connection, table: &str) -> rusqlite::Result<TableInfo> {
        let mut stmt = conn.prepare(
            "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let columns = stmt
            .query_map(params![table], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    decl_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    not_null: row.get::<_, i64>(2)? != 0,
                    primary_key: row.get::<_, i64>(3)? > 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )?;
        let foreign_keys = stmt
            .query_map(params![table], |row| {
                Ok(ForeignKey {
                    from: row.get(0)?,
                    table: row.get(1)?,
                    to: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // Example rows are best effort: a failure only drops the example.
        let example_sql = format!("SELECT * FROM {} LIMIT 1", quote_ident(table));
        let example_row = match query_rows(conn, &example_sql) {
            Ok(rows) => rows.into_iter().next(),
            Err(e) => {
                debug!("Skipping example row for {}: {}", table, e);
                None
            }
        };

        Ok(TableInfo {
            name: table.to_string(),
            columns,
            foreign_keys,
            example_row,
        })
    }
}

impl Database for SqliteDatabase {
    fn describe_schema(&self) -> Result<SchemaDescription, DbError> {
        let conn = self.connect()?;
        let introspect = || -> rusqlite::Result<SchemaDescription> {
            let mut tables = Vec::new();
            for name in Self::table_names(&conn)? {
                tables.push(Self::table_info(&conn, &name)?);
            }
            Ok(SchemaDescription { tables })
        };
        introspect().map_err(|e| DbError::Unavailable(e.to_string()))
    }

    fn execute(&self, sql: &str) -> Result<Rows, DbError> {
        let conn = self.connect()?;
        query_rows(&conn, strip_terminator(sql))
    }

    fn dry_run_check(&self, sql: &str) -> Result<(), DbError> {
        let conn = self.connect()?;
        query_rows(&conn, &format!("EXPLAIN {}", strip_terminator(sql)))?;
        Ok(())
    }
}

fn query_rows(conn: &Connection, sql: &str) -> Result<Rows, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let column_count = stmt.column_count();
    let mut rows = stmt.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(row.get::<_, Value>(i)?);
        }
        out.push(values);
    }
    Ok(out)
}

/// Drop trailing `;` and whitespace so a single statement prepares cleanly.
fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
