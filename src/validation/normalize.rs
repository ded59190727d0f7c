//! Normalizer
//!
//! Canonical single-line re-serialization of parsed SQL: keywords and function
//! names upper case, unquoted identifiers lower case, single spaces, no trailing
//! terminator. String literals and quoted identifiers are left untouched.
//! `normalize(normalize(x)) == normalize(x)`.

use super::sql_validator::{parse, ValidationError};
use itertools::Itertools;
use sqlparser::ast::{
    Expr, Ident, ObjectName, Query, SelectItem, SetExpr, TableFactor, VisitMut, VisitorMut,
};
use std::convert::Infallible;
use std::ops::ControlFlow;

/// Canonicalize `sql`. Parse failures are returned to the caller, which
/// decides how to fall back.
pub fn normalize(sql: &str) -> Result<String, ValidationError> {
    let mut statements = parse(sql)?;
    if statements.is_empty() {
        return Err(ValidationError::ParseFailure("empty statement".to_string()));
    }

    for statement in statements.iter_mut() {
        if let ControlFlow::Break(never) = statement.visit(&mut Canonicalizer) {
            match never {}
        }
    }
    Ok(statements.iter().map(ToString::to_string).join("; "))
}

/// Literal comparison used when either side fails to parse.
pub fn literal_eq(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

struct Canonicalizer;

fn lower(ident: &mut Ident) {
    if ident.quote_style.is_none() {
        ident.value = ident.value.to_lowercase();
    }
}

fn lower_name(name: &mut ObjectName) {
    name.0.iter_mut().for_each(lower);
}

fn lower_projection_aliases(body: &mut SetExpr) {
    match body {
        SetExpr::Select(select) => {
            for item in select.projection.iter_mut() {
                if let SelectItem::ExprWithAlias { alias, .. } = item {
                    lower(alias);
                }
            }
        }
        SetExpr::SetOperation { left, right, .. } => {
            lower_projection_aliases(left);
            lower_projection_aliases(right);
        }
        _ => {}
    }
}

impl VisitorMut for Canonicalizer {
    type Break = Infallible;

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<Self::Break> {
        if let Some(with) = query.with.as_mut() {
            for cte in with.cte_tables.iter_mut() {
                lower(&mut cte.alias.name);
            }
        }
        lower_projection_aliases(&mut query.body);
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &mut ObjectName) -> ControlFlow<Self::Break> {
        lower_name(relation);
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &mut TableFactor) -> ControlFlow<Self::Break> {
        match table_factor {
            TableFactor::Table {
                alias: Some(alias), ..
            }
            | TableFactor::Derived {
                alias: Some(alias), ..
            } => lower(&mut alias.name),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => lower(ident),
            Expr::CompoundIdentifier(parts) => parts.iter_mut().for_each(lower),
            Expr::Function(func) => {
                for ident in func.name.0.iter_mut() {
                    if ident.quote_style.is_none() {
                        ident.value = ident.value.to_uppercase();
                    }
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_whitespace_insensitive() {
        assert_eq!(
            normalize("select a from t").unwrap(),
            normalize("SELECT a FROM t ;").unwrap()
        );
        assert_eq!(
            normalize("select count(*)\n  from   TRACKS").unwrap(),
            normalize("SELECT COUNT(*) FROM tracks;").unwrap()
        );
        assert_eq!(
            normalize("SELECT Albums.Title AS N FROM Albums ORDER BY N").unwrap(),
            normalize("select albums.title as n from albums order by n").unwrap()
        );
    }

    #[test]
    fn test_cte_and_alias_names_are_lowered() {
        assert_eq!(
            normalize("WITH Recent AS (SELECT Id AS TrackId FROM Tracks) SELECT L.TrackId FROM Recent L").unwrap(),
            "WITH recent AS (SELECT id AS trackid FROM tracks) SELECT l.trackid FROM recent AS l"
        );
    }

    #[test]
    fn test_canonical_form() {
        assert_eq!(
            normalize("select count(*) from tracks;").unwrap(),
            "SELECT COUNT(*) FROM tracks"
        );
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "select a from t",
            "SELECT artists.name, COUNT(albums.id) FROM artists LEFT JOIN albums ON albums.artist_id = artists.id GROUP BY artists.id HAVING COUNT(albums.id) > 1;",
            "with x as (select id from tracks) select * from x where id in (select id from x) limit 5",
            "SELECT name FROM artists UNION SELECT title FROM albums",
        ];
        for sql in inputs {
            let once = normalize(sql).unwrap();
            let twice = normalize(&once).unwrap();
            assert_eq!(once, twice, "{}", sql);
        }
    }

    #[test]
    fn test_literals_keep_case() {
        assert_ne!(
            normalize("SELECT name FROM tracks WHERE genre = 'Rock'").unwrap(),
            normalize("SELECT name FROM tracks WHERE genre = 'rock'").unwrap()
        );
    }

    #[test]
    fn test_parse_failure_is_an_error() {
        assert!(normalize("SELEC name FRM tracks").is_err());
        assert!(normalize("").is_err());
    }

    #[test]
    fn test_literal_fallback() {
        assert!(literal_eq("  SELEC x ", "selec X"));
        assert!(!literal_eq("SELEC x", "SELEC y"));
    }
}
