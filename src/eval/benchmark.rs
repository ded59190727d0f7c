//! Benchmark loop
//!
//! Items run strictly in input order, each against its own database handle.
//! A failing item is classified and recorded; it never aborts the run.
//!
//! Execution accuracy is ordered tuple equality, so a correct query that
//! returns the same rows in another order without `ORDER BY` counts as a
//! logic error.

use super::dataset::BenchmarkItem;
use crate::db::{Database, SqliteDatabase};
use crate::error::Result;
use crate::execution_loop::{ErrorClass, ErrorClassifier, TextToSqlPipeline};
use crate::providers::SqlGenerator;
use crate::validation::{literal_eq, normalize};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub question: String,
    pub gold_sql: String,
    /// Empty when the pipeline failed
    pub pred_sql: String,
    pub em: bool,
    pub ex: bool,
    pub error: Option<ErrorClass>,
}

/// Metrics of one benchmark run. Rates are in `[0, 1]`, rounded to 4 places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub count: usize,
    pub provider: String,
    pub em: f64,
    pub ex: f64,
    pub syntax_error_rate: f64,
    pub logic_error_rate: f64,
    pub execution_error_rate: f64,
    pub results: Vec<BenchmarkResult>,
}

impl AggregateMetrics {
    fn from_results(provider: &str, results: Vec<BenchmarkResult>) -> Self {
        let count = results.len();
        let rate = |hits: usize| {
            if count == 0 {
                0.0
            } else {
                round4(hits as f64 / count as f64)
            }
        };
        let errors = |class: ErrorClass| results.iter().filter(|r| r.error == Some(class)).count();

        Self {
            count,
            provider: provider.to_string(),
            em: rate(results.iter().filter(|r| r.em).count()),
            ex: rate(results.iter().filter(|r| r.ex).count()),
            syntax_error_rate: rate(errors(ErrorClass::Syntax)),
            logic_error_rate: rate(errors(ErrorClass::Logic)),
            execution_error_rate: rate(errors(ErrorClass::Execution)),
            results,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BenchmarkOptions {
    /// Used when an item has no database of its own under `db_root`
    pub default_db: PathBuf,
    pub db_root: Option<PathBuf>,
    pub limit: Option<usize>,
}

impl BenchmarkOptions {
    pub fn new(default_db: impl Into<PathBuf>) -> Self {
        Self {
            default_db: default_db.into(),
            ..Default::default()
        }
    }

    pub fn with_db_root(mut self, db_root: impl Into<PathBuf>) -> Self {
        self.db_root = Some(db_root.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Database file for an item: `root/id/id.sqlite`, then `root/id/id`, then
/// the default database.
pub fn resolve_db_path(item: &BenchmarkItem, opts: &BenchmarkOptions) -> PathBuf {
    if let (Some(root), Some(db_id)) = (&opts.db_root, &item.db_id) {
        let dir = root.join(db_id);
        let candidates = [dir.join(format!("{}.sqlite", db_id)), dir.join(db_id)];
        if let Some(found) = candidates.iter().find(|p| p.is_file()) {
            return found.clone();
        }
        debug!("No database for db_id {} under {}", db_id, root.display());
    }
    opts.default_db.clone()
}

/// Normalized textual equality, falling back to trimmed case-insensitive
/// comparison when either side fails to parse.
pub fn exact_match(pred: &str, gold: &str) -> bool {
    match (normalize(pred), normalize(gold)) {
        (Ok(p), Ok(g)) => p == g,
        _ => literal_eq(pred, gold),
    }
}

/// Ordered row equality of both queries. Any execution failure is `false`.
pub fn execution_accuracy(pred: &str, gold: &str, db: &dyn Database) -> bool {
    let pred_rows = match db.execute(pred) {
        Ok(rows) => rows,
        Err(e) => {
            debug!("Predicted SQL failed on re-execution: {}", e);
            return false;
        }
    };
    let gold_rows = match db.execute(gold) {
        Ok(rows) => rows,
        Err(e) => {
            debug!("Gold SQL failed: {}", e);
            return false;
        }
    };
    pred_rows == gold_rows
}

/// Run every item through the pipeline and aggregate EM/EX and error rates.
///
/// Fails only when `provider` cannot be resolved at all.
pub fn evaluate(
    items: &[BenchmarkItem],
    provider: &str,
    opts: &BenchmarkOptions,
    pipeline: &TextToSqlPipeline,
) -> Result<AggregateMetrics> {
    let generator = pipeline.registry().get(provider)?;
    let classifier = ErrorClassifier::new();
    let items = match opts.limit {
        Some(limit) => &items[..limit.min(items.len())],
        None => items,
    };
    let total = items.len();
    let mut results = Vec::with_capacity(total);

    for (index, item) in items.iter().enumerate() {
        let db_path = resolve_db_path(item, opts);
        let db = SqliteDatabase::new(db_path);
        let result = evaluate_item(item, &db, pipeline, generator, &classifier);
        info!(
            "[{}/{}] provider={} em={} ex={} error={}",
            index + 1,
            total,
            provider,
            result.em,
            result.ex,
            result.error.map(|e| e.to_string()).unwrap_or_else(|| "-".to_string())
        );
        results.push(result);
    }

    let metrics = AggregateMetrics::from_results(provider, results);
    info!(
        "Benchmark {} done: n={} em={} ex={}",
        provider, metrics.count, metrics.em, metrics.ex
    );
    Ok(metrics)
}

fn evaluate_item(
    item: &BenchmarkItem,
    db: &dyn Database,
    pipeline: &TextToSqlPipeline,
    generator: &dyn SqlGenerator,
    classifier: &ErrorClassifier,
) -> BenchmarkResult {
    let mut result = BenchmarkResult {
        question: item.question.clone(),
        gold_sql: item.query.clone(),
        pred_sql: String::new(),
        em: false,
        ex: false,
        error: None,
    };

    match pipeline.run_with(&item.question, generator, db) {
        Ok(output) => {
            result.em = exact_match(&output.sql, &item.query);
            result.ex = execution_accuracy(&output.sql, &item.query, db);
            if !result.ex {
                result.error = Some(ErrorClass::Logic);
            }
            result.pred_sql = output.sql;
        }
        Err(e) => {
            result.error = Some(classifier.classify(&e));
        }
    }
    result
}

/// Convenience for callers holding only a path.
pub fn evaluate_path(
    dataset: &Path,
    provider: &str,
    opts: &BenchmarkOptions,
    pipeline: &TextToSqlPipeline,
) -> Result<AggregateMetrics> {
    let items = super::dataset::load_dataset(dataset)?;
    evaluate(&items, provider, opts, pipeline)
}
