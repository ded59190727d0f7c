//! SQL Validator
//!
//! Parses candidate SQL with the SQLite dialect and checks, in order:
//! 1. the statement kind is read-only (SELECT, set operation or WITH), on the
//!    parsed tree, so comments, casing and clause order cannot disguise a write
//! 2. every referenced table exists in the schema
//! 3. every qualified `table.column` reference exists in the schema
//!
//! Qualifiers resolve against the innermost enclosing query that declares
//! them, so subqueries may reuse an outer alias. Columns reached through a
//! CTE, derived table or their aliases are not checked.
//!
//! Unqualified column references are NOT checked. Binding `name` to its owning
//! table needs join-aware resolution that this validator does not perform, so
//! an unqualified column that exists nowhere passes validation and only fails
//! later at execution.

use crate::db::SchemaMap;
use sqlparser::ast::{
    Expr, ObjectName, Query, SetExpr, Statement, TableFactor, TableWithJoins, Visit, Visitor,
};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::ControlFlow;
use thiserror::Error;

/// Why a candidate statement was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("parse_error: {0}")]
    ParseFailure(String),

    #[error("only SELECT/UNION/CTE statements are allowed (got {0})")]
    DisallowedStatement(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

/// `Ok(())` or the first rejection reason. Never both.
pub type ValidationOutcome = Result<(), ValidationError>;

/// Parse `sql` under the SQLite dialect.
pub fn parse(sql: &str) -> Result<Vec<Statement>, ValidationError> {
    Parser::parse_sql(&SQLiteDialect {}, sql).map_err(|e| ValidationError::ParseFailure(e.to_string()))
}

/// Validate `sql` against `schema`. Each call parses and checks from scratch.
pub fn validate(sql: &str, schema: &SchemaMap) -> ValidationOutcome {
    let statements = parse(sql)?;
    let statement = match statements.as_slice() {
        [] => return Err(ValidationError::ParseFailure("empty statement".to_string())),
        [single] => single,
        _ => {
            return Err(ValidationError::DisallowedStatement(
                "multiple statements".to_string(),
            ))
        }
    };

    check_statement_kind(statement)?;

    let mut tables = TableCheck {
        schema,
        scopes: Scopes::default(),
    };
    break_to_err(statement.visit(&mut tables))?;

    let mut columns = ColumnCheck {
        known: schema.qualified_columns(),
        scopes: Scopes::default(),
    };
    break_to_err(statement.visit(&mut columns))
}

fn break_to_err(flow: ControlFlow<ValidationError>) -> ValidationOutcome {
    match flow {
        ControlFlow::Break(e) => Err(e),
        ControlFlow::Continue(()) => Ok(()),
    }
}

fn check_statement_kind(statement: &Statement) -> ValidationOutcome {
    let query = match statement {
        Statement::Query(query) => query,
        other => return Err(ValidationError::DisallowedStatement(statement_keyword(other))),
    };
    if !is_select_body(&query.body) {
        return Err(ValidationError::DisallowedStatement(body_keyword(&query.body)));
    }

    // Nested statements (e.g. a CTE body or `WITH ... INSERT`) are rejected too.
    break_to_err(statement.visit(&mut ReadOnlyGuard))
}

fn is_select_body(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(_) | SetExpr::SetOperation { .. } => true,
        SetExpr::Query(inner) => is_select_body(&inner.body),
        _ => false,
    }
}

fn statement_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

fn body_keyword(body: &SetExpr) -> String {
    match body {
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => statement_keyword(stmt),
        SetExpr::Values(_) => "VALUES".to_string(),
        SetExpr::Table(_) => "TABLE".to_string(),
        _ => "query".to_string(),
    }
}

/// Last identifier of a possibly schema-qualified name (`main.tracks` -> `tracks`).
fn base_name(name: &ObjectName) -> String {
    name.0.last().map(|ident| ident.value.clone()).unwrap_or_default()
}

struct ReadOnlyGuard;

impl Visitor for ReadOnlyGuard {
    type Break = ValidationError;

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        match statement {
            Statement::Query(_) => ControlFlow::Continue(()),
            other => ControlFlow::Break(ValidationError::DisallowedStatement(statement_keyword(other))),
        }
    }

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        match first_write(&query.body) {
            Some(keyword) => ControlFlow::Break(ValidationError::DisallowedStatement(keyword)),
            None => ControlFlow::Continue(()),
        }
    }
}

fn first_write(body: &SetExpr) -> Option<String> {
    match body {
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => Some(statement_keyword(stmt)),
        SetExpr::SetOperation { left, right, .. } => first_write(left).or_else(|| first_write(right)),
        _ => None,
    }
}

/// What a qualifier in one query scope refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Binding {
    Table(String),
    /// CTE, derived table or table function: columns are not in the schema
    Opaque,
}

/// Names one query level declares: its CTEs and the relations of its FROM
/// clauses, keyed by alias or table name.
#[derive(Debug, Default)]
struct Frame {
    ctes: HashSet<String>,
    bindings: HashMap<String, Vec<Binding>>,
}

/// Stack of query scopes, innermost last. Pushed on entering a query and
/// popped on leaving it.
#[derive(Debug, Default)]
struct Scopes {
    frames: Vec<Frame>,
}

impl Scopes {
    fn enter(&mut self, query: &Query) {
        let ctes = query
            .with
            .iter()
            .flat_map(|with| with.cte_tables.iter())
            .map(|cte| cte.alias.name.value.clone())
            .collect();
        self.frames.push(Frame {
            ctes,
            bindings: HashMap::new(),
        });

        let mut bindings = HashMap::new();
        self.bind_body(&query.body, &mut bindings);
        if let Some(frame) = self.frames.last_mut() {
            frame.bindings = bindings;
        }
    }

    fn leave(&mut self) {
        self.frames.pop();
    }

    fn is_cte(&self, name: &str) -> bool {
        self.frames.iter().any(|frame| frame.ctes.contains(name))
    }

    /// Bindings of the innermost scope declaring `qualifier`.
    fn resolve(&self, qualifier: &str) -> Option<&[Binding]> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.bindings.get(qualifier))
            .map(Vec::as_slice)
    }

    // Nested `SetExpr::Query` bodies are queries of their own and get a frame
    // when the visitor reaches them.
    fn bind_body(&self, body: &SetExpr, out: &mut HashMap<String, Vec<Binding>>) {
        match body {
            SetExpr::Select(select) => {
                for from in &select.from {
                    self.bind_from(from, out);
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.bind_body(left, out);
                self.bind_body(right, out);
            }
            _ => {}
        }
    }

    fn bind_from(&self, from: &TableWithJoins, out: &mut HashMap<String, Vec<Binding>>) {
        self.bind_factor(&from.relation, out);
        for join in &from.joins {
            self.bind_factor(&join.relation, out);
        }
    }

    fn bind_factor(&self, factor: &TableFactor, out: &mut HashMap<String, Vec<Binding>>) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let table = base_name(name);
                let binding = if name.0.len() == 1 && self.is_cte(&table) {
                    Binding::Opaque
                } else {
                    Binding::Table(table.clone())
                };
                let key = alias.as_ref().map(|a| a.name.value.clone()).unwrap_or(table);
                out.entry(key).or_default().push(binding);
            }
            TableFactor::NestedJoin {
                table_with_joins,
                alias: None,
            } => self.bind_from(table_with_joins, out),
            TableFactor::Derived { alias: Some(alias), .. }
            | TableFactor::NestedJoin { alias: Some(alias), .. }
            | TableFactor::TableFunction { alias: Some(alias), .. }
            | TableFactor::Function { alias: Some(alias), .. }
            | TableFactor::UNNEST { alias: Some(alias), .. }
            | TableFactor::JsonTable { alias: Some(alias), .. }
            | TableFactor::Pivot { alias: Some(alias), .. }
            | TableFactor::Unpivot { alias: Some(alias), .. } => {
                out.entry(alias.name.value.clone()).or_default().push(Binding::Opaque);
            }
            _ => {}
        }
    }
}

struct TableCheck<'a> {
    schema: &'a SchemaMap,
    scopes: Scopes,
}

impl Visitor for TableCheck<'_> {
    type Break = ValidationError;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        self.scopes.enter(query);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.scopes.leave();
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        let table = base_name(relation);
        if self.scopes.is_cte(&table) || self.schema.contains_table(&table) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(ValidationError::UnknownTable(table))
        }
    }
}

struct ColumnCheck {
    known: BTreeSet<String>,
    scopes: Scopes,
}

impl ColumnCheck {
    fn has_column(&self, binding: &Binding, column: &str) -> bool {
        match binding {
            Binding::Opaque => true,
            Binding::Table(table) => self.known.contains(&format!("{}.{}", table, column)),
        }
    }
}

impl Visitor for ColumnCheck {
    type Break = ValidationError;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        self.scopes.enter(query);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.scopes.leave();
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        let Expr::CompoundIdentifier(parts) = expr else {
            return ControlFlow::Continue(());
        };
        let [.., qualifier, column] = parts.as_slice() else {
            return ControlFlow::Continue(());
        };
        let (qualifier, column) = (qualifier.value.as_str(), column.value.as_str());

        let found = match self.scopes.resolve(qualifier) {
            // A reused alias may bind several relations across set operation arms
            Some(bindings) => bindings.iter().any(|b| self.has_column(b, column)),
            None if self.scopes.is_cte(qualifier) => true,
            None => self.has_column(&Binding::Table(qualifier.to_string()), column),
        };
        if found {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(ValidationError::UnknownColumn(format!(
                "{}.{}",
                qualifier, column
            )))
        }
    }
}
