use rusqlite::Connection;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;
use text2sql::db::demo::init_demo_db;
use text2sql::error::{PipelineError, ProviderError};
use text2sql::eval::execution_accuracy;
use text2sql::execution_loop::MAX_ATTEMPTS;
use text2sql::prompting::{ExamplePair, GenerationContext};
use text2sql::validation::ValidationError;
use text2sql::{ProviderRegistry, SqlGenerator, SqliteDatabase, TextToSqlPipeline};

/// Database with a single `tracks(id, name)` table.
fn tracks_db(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("tracks.sqlite");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE tracks (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         INSERT INTO tracks(name) VALUES ('Intro'), ('Fire'), ('Water');",
    )
    .unwrap();
    path
}

/// Replays a fixed list of replies and keeps every context it was given.
struct Scripted {
    replies: Vec<&'static str>,
    seen: Rc<RefCell<Vec<GenerationContext>>>,
}

impl Scripted {
    fn new(replies: Vec<&'static str>) -> (Self, Rc<RefCell<Vec<GenerationContext>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                replies,
                seen: Rc::clone(&seen),
            },
            seen,
        )
    }
}

impl SqlGenerator for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate_sql(&self, ctx: &GenerationContext) -> Result<String, ProviderError> {
        let mut seen = self.seen.borrow_mut();
        seen.push(ctx.clone());
        let reply = self.replies[(seen.len() - 1).min(self.replies.len() - 1)];
        Ok(reply.to_string())
    }
}

fn pipeline_with(generator: Scripted) -> TextToSqlPipeline {
    let mut registry = ProviderRegistry::new();
    registry.register(Box::new(generator));
    TextToSqlPipeline::new(registry)
}

fn open(path: &Path) -> SqliteDatabase {
    SqliteDatabase::new(path)
}

#[test]
fn test_naive_count_matches_gold() {
    let dir = TempDir::new().unwrap();
    let db = open(&tracks_db(&dir));
    let mut registry = ProviderRegistry::new();
    registry.register(Box::new(text2sql::providers::NaiveGenerator::new()));
    let pipeline = TextToSqlPipeline::new(registry);

    let output = pipeline.run("How many tracks?", "naive", &db).unwrap();

    assert_eq!(output.sql, "SELECT COUNT(*) FROM tracks;");
    assert_eq!(output.summary, "Found 3 items");
    assert!(execution_accuracy(&output.sql, "SELECT COUNT(*) FROM tracks;", &db));
}

#[test]
fn test_drop_is_rejected_and_retried_once() {
    let dir = TempDir::new().unwrap();
    let db = open(&tracks_db(&dir));
    let (generator, seen) = Scripted::new(vec!["DROP TABLE tracks;"]);
    let pipeline = pipeline_with(generator);

    let err = pipeline.run("How many tracks are stored?", "scripted", &db).unwrap_err();

    assert!(matches!(
        err,
        PipelineError::ValidationFailed(ValidationError::DisallowedStatement(_))
    ));
    assert!(err.to_string().starts_with("validation_failed: "));

    let seen = seen.borrow();
    assert_eq!(seen.len(), MAX_ATTEMPTS as usize);
    let retry = &seen[1];
    assert_eq!(retry.previous_sql(), Some("DROP TABLE tracks;"));
    let prior_error = retry.previous_error().unwrap();
    assert!(prior_error.contains("only SELECT/UNION/CTE statements are allowed"));
    assert!(retry.question().contains(&format!("Previous SQL was invalid: {}", prior_error)));

    // The table survived
    let count = Connection::open(dir.path().join("tracks.sqlite"))
        .unwrap()
        .query_row("SELECT COUNT(*) FROM tracks", [], |r| r.get::<_, i64>(0))
        .unwrap();
    assert_eq!(count, 3);
}

#[test]
fn test_execution_error_is_repaired() {
    let dir = TempDir::new().unwrap();
    let db = open(&tracks_db(&dir));
    let (generator, seen) = Scripted::new(vec![
        "SELECT no_such_fn(tracks.name) FROM tracks",
        "SELECT tracks.name FROM tracks ORDER BY tracks.id",
    ]);
    let pipeline = pipeline_with(generator);

    let output = pipeline.run("List every track name in order", "scripted", &db).unwrap();

    assert_eq!(output.attempts, 2);
    assert_eq!(output.rows.len(), 3);
    let seen = seen.borrow();
    assert!(seen[1].previous_error().unwrap().contains("no_such_fn"));
    assert!(seen[1].question().starts_with("List every track name in order\n"));
}

#[test]
fn test_exhausted_budget_surfaces_last_error() {
    let dir = TempDir::new().unwrap();
    let db = open(&tracks_db(&dir));
    let (generator, seen) = Scripted::new(vec![
        "SELECT tracks.title FROM tracks",
        "SELECT no_such_fn(tracks.name) FROM tracks",
    ]);
    let pipeline = pipeline_with(generator);

    let err = pipeline.run("List every track title in order", "scripted", &db).unwrap_err();

    // Last attempt decides the classification
    assert!(matches!(err, PipelineError::ExecutionFailed(ref m) if m.contains("no_such_fn")));
    assert_eq!(seen.borrow().len(), 2);
    assert_eq!(
        seen.borrow()[1].previous_error(),
        Some("unknown column: tracks.title")
    );
}

#[test]
fn test_missing_database_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir.path().join("missing.sqlite"));
    let (generator, seen) = Scripted::new(vec!["SELECT 1"]);
    let pipeline = pipeline_with(generator);

    let err = pipeline.run("How many tracks are stored?", "scripted", &db).unwrap_err();

    assert!(matches!(err, PipelineError::SchemaUnavailable(_)));
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_unregistered_provider() {
    let dir = TempDir::new().unwrap();
    let db = open(&tracks_db(&dir));
    let pipeline = TextToSqlPipeline::new(ProviderRegistry::new());

    let err = pipeline.run("How many tracks?", "openai", &db).unwrap_err();
    assert!(matches!(err, PipelineError::GeneratorUnavailable(_)));
}

#[test]
fn test_injected_examples_reach_the_generator() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("demo.sqlite");
    init_demo_db(&db_path).unwrap();
    let db = open(&db_path);

    let (generator, seen) = Scripted::new(vec!["SELECT artists.name FROM artists"]);
    let pipeline = pipeline_with(generator)
        .with_examples(vec![ExamplePair::new("Name every artist", "SELECT name FROM artists;")]);

    let output = pipeline.run("Which artists are in the catalog?", "scripted", &db).unwrap();
    assert_eq!(output.rows.len(), 3);
    assert_eq!(output.summary, "Found 3 results");

    let seen = seen.borrow();
    assert_eq!(seen[0].examples(), &[ExamplePair::new("Name every artist", "SELECT name FROM artists;")]);
    assert!(seen[0].schema().contains("TABLE albums"));
    assert!(seen[0].schema().contains("FOREIGN KEY (artist_id) REFERENCES artists(id)"));
}

#[test]
fn test_schema_is_read_fresh_on_every_run() {
    let dir = TempDir::new().unwrap();
    let path = tracks_db(&dir);
    let db = open(&path);
    let (generator, seen) = Scripted::new(vec!["SELECT genres.name FROM genres"]);
    let pipeline = pipeline_with(generator);

    let err = pipeline.run("Which genres are there?", "scripted", &db).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::ValidationFailed(ValidationError::UnknownTable(ref t)) if t == "genres"
    ));

    Connection::open(&path)
        .unwrap()
        .execute_batch(
            "CREATE TABLE genres (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             INSERT INTO genres(name) VALUES ('Rock'), ('Jazz');",
        )
        .unwrap();

    let output = pipeline.run("Which genres are there?", "scripted", &db).unwrap();
    assert_eq!(output.rows.len(), 2);
    assert_eq!(output.attempts, 1);
    assert!(seen.borrow().last().unwrap().schema().contains("TABLE genres"));
}
