//! Generation-Repair Pipeline
//!
//! Generate, validate and execute SQL for one question, with a single repair
//! attempt. The loop is an explicit state machine so the attempt budget and
//! the question amendments can be followed transition by transition:
//!
//! ```text
//! Start(1) --fail--> Retry --> Start(2) --fail--> Done(Err)
//!    \                            \
//!     `--ok--> Done(Ok)            `--ok--> Done(Ok)
//! ```

use crate::db::{Database, Rows, SchemaDescriptor};
use crate::error::{PipelineError, ProviderError, Result};
use crate::prompting::{clarify, repair_amendment, ExamplePair, GenerationContext};
use crate::providers::{ProviderRegistry, SqlGenerator};
use crate::validation::{validate, ValidationError};
use tracing::{debug, info, warn};

/// Generator invocations allowed per `run`.
pub const MAX_ATTEMPTS: u8 = 2;

/// Successful pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub sql: String,
    pub rows: Rows,
    pub summary: String,
    /// 1-based attempt that succeeded
    pub attempts: u8,
}

/// How a single attempt ended.
#[derive(Debug)]
pub enum AttemptOutcome {
    GenerationFailed(ProviderError),
    Rejected(ValidationError),
    ExecutionFailed(String),
    Succeeded(Rows),
}

impl AttemptOutcome {
    /// Error text carried into the next attempt.
    fn error_text(&self) -> Option<String> {
        match self {
            AttemptOutcome::GenerationFailed(e) => Some(e.to_string()),
            AttemptOutcome::Rejected(e) => Some(e.to_string()),
            AttemptOutcome::ExecutionFailed(msg) => Some(msg.clone()),
            AttemptOutcome::Succeeded(_) => None,
        }
    }

    /// Terminal error when no attempts remain; `None` on success.
    fn into_error(self) -> Option<PipelineError> {
        match self {
            AttemptOutcome::GenerationFailed(e) => Some(PipelineError::GenerationFailed(e.to_string())),
            AttemptOutcome::Rejected(e) => Some(PipelineError::ValidationFailed(e)),
            AttemptOutcome::ExecutionFailed(msg) => Some(PipelineError::ExecutionFailed(msg)),
            AttemptOutcome::Succeeded(_) => None,
        }
    }
}

/// One generate-validate-execute cycle.
#[derive(Debug)]
pub struct AttemptRecord {
    pub attempt: u8,
    /// Empty when generation failed
    pub sql: String,
    pub outcome: AttemptOutcome,
}

/// Prior failed attempt, fed into the next context.
#[derive(Debug, Clone)]
struct PriorAttempt {
    sql: String,
    error: String,
}

enum State {
    Start {
        attempt: u8,
        question: String,
        prior: Option<PriorAttempt>,
    },
    Retry {
        attempt: u8,
        question: String,
        prior: PriorAttempt,
    },
    Done(Result<PipelineOutput>),
}

/// Text-to-SQL pipeline over a set of named generators.
///
/// Feedback examples are injected at construction; the pipeline never reads
/// the feedback log itself.
pub struct TextToSqlPipeline {
    registry: ProviderRegistry,
    examples: Vec<ExamplePair>,
}

impl TextToSqlPipeline {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            examples: Vec::new(),
        }
    }

    pub fn with_examples(mut self, examples: Vec<ExamplePair>) -> Self {
        self.examples = examples;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Answer `question` with the generator registered as `provider`.
    pub fn run(&self, question: &str, provider: &str, db: &dyn Database) -> Result<PipelineOutput> {
        let generator = self.registry.get(provider)?;
        self.run_with(question, generator, db)
    }

    /// Same as [`TextToSqlPipeline::run`] for an already-resolved generator.
    pub fn run_with(
        &self,
        question: &str,
        generator: &dyn SqlGenerator,
        db: &dyn Database,
    ) -> Result<PipelineOutput> {
        info!("Pipeline start: provider={} question={:?}", generator.name(), question);

        let mut state = State::Start {
            attempt: 1,
            question: clarify(question),
            prior: None,
        };

        loop {
            state = match state {
                State::Start {
                    attempt,
                    question: amended,
                    prior,
                } => {
                    info!("Attempt {} of {}", attempt, MAX_ATTEMPTS);
                    match self.attempt(generator, db, attempt, &amended, prior.as_ref()) {
                        Err(fatal) => {
                            warn!("Attempt {} aborted: {}", attempt, fatal);
                            State::Done(Err(fatal))
                        }
                        Ok(record) => self.next_state(generator, question, amended, record),
                    }
                }
                State::Retry {
                    attempt,
                    question: amended,
                    prior,
                } => State::Start {
                    attempt: attempt + 1,
                    question: repair_amendment(&amended, &prior.error),
                    prior: Some(prior),
                },
                State::Done(result) => return result,
            };
        }
    }

    fn next_state(
        &self,
        generator: &dyn SqlGenerator,
        original_question: &str,
        amended: String,
        record: AttemptRecord,
    ) -> State {
        let AttemptRecord { attempt, sql, outcome } = record;

        match outcome {
            AttemptOutcome::Succeeded(rows) => {
                info!("Attempt {} succeeded with {} rows", attempt, rows.len());
                let summary = generator.summarize(original_question, &rows);
                State::Done(Ok(PipelineOutput {
                    sql,
                    rows,
                    summary,
                    attempts: attempt,
                }))
            }
            failure if attempt < MAX_ATTEMPTS => State::Retry {
                attempt,
                question: amended,
                prior: PriorAttempt {
                    sql,
                    error: failure.error_text().unwrap_or_default(),
                },
            },
            failure => {
                let error = failure.into_error().unwrap_or_else(|| {
                    PipelineError::ExecutionFailed("attempt ended without outcome".to_string())
                });
                warn!("Retry budget exhausted: {}", error);
                State::Done(Err(error))
            }
        }
    }

    /// Run one attempt. `Err` only for failures that are never retried.
    fn attempt(
        &self,
        generator: &dyn SqlGenerator,
        db: &dyn Database,
        attempt: u8,
        question: &str,
        prior: Option<&PriorAttempt>,
    ) -> Result<AttemptRecord> {
        // Rebuilt every attempt; a retry never sees a cached schema.
        let schema = SchemaDescriptor::describe(db)?;

        let mut ctx = GenerationContext::new(schema.text, question).with_examples(self.examples.clone());
        if let Some(prior) = prior {
            ctx = ctx.with_previous(prior.sql.as_str(), prior.error.as_str());
        }

        let sql = match generator.generate_sql(&ctx) {
            Ok(sql) => sql.trim().to_string(),
            Err(e) => {
                warn!("Attempt {}: generator {} failed: {}", attempt, generator.name(), e);
                return Ok(AttemptRecord {
                    attempt,
                    sql: String::new(),
                    outcome: AttemptOutcome::GenerationFailed(e),
                });
            }
        };
        debug!("Attempt {} generated: {}", attempt, sql);

        if let Err(reason) = validate(&sql, &schema.map) {
            warn!("Attempt {} rejected: {}", attempt, reason);
            return Ok(AttemptRecord {
                attempt,
                sql,
                outcome: AttemptOutcome::Rejected(reason),
            });
        }

        let outcome = match db.dry_run_check(&sql).and_then(|_| db.execute(&sql)) {
            Ok(rows) => AttemptOutcome::Succeeded(rows),
            Err(e) => {
                warn!("Attempt {} execution failed: {}", attempt, e);
                AttemptOutcome::ExecutionFailed(e.to_string())
            }
        };

        Ok(AttemptRecord { attempt, sql, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{ColumnInfo, TableInfo};
    use crate::db::{SchemaDescription, Value};
    use crate::error::DbError;
    use std::cell::RefCell;

    /// In-memory database with a `tracks(id, name)` table.
    struct FakeDb {
        fail_execution: bool,
    }

    impl Database for FakeDb {
        fn describe_schema(&self) -> std::result::Result<SchemaDescription, DbError> {
            let column = |name: &str| ColumnInfo {
                name: name.to_string(),
                decl_type: "INTEGER".to_string(),
                not_null: false,
                primary_key: name == "id",
            };
            Ok(SchemaDescription {
                tables: vec![TableInfo {
                    name: "tracks".to_string(),
                    columns: vec![column("id"), column("name")],
                    foreign_keys: Vec::new(),
                    example_row: None,
                }],
            })
        }

        fn execute(&self, _sql: &str) -> std::result::Result<Rows, DbError> {
            if self.fail_execution {
                return Err(DbError::Query("no such function: FOO".to_string()));
            }
            Ok(vec![vec![Value::Integer(8)]])
        }

        fn dry_run_check(&self, _sql: &str) -> std::result::Result<(), DbError> {
            Ok(())
        }
    }

    /// Replays SQL in order and records every context it receives.
    struct Scripted {
        replies: Vec<std::result::Result<&'static str, &'static str>>,
        seen: RefCell<Vec<GenerationContext>>,
    }

    impl Scripted {
        fn new(replies: Vec<std::result::Result<&'static str, &'static str>>) -> Self {
            Self {
                replies,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl SqlGenerator for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate_sql(&self, ctx: &GenerationContext) -> std::result::Result<String, ProviderError> {
            let index = self.seen.borrow().len();
            self.seen.borrow_mut().push(ctx.clone());
            match self.replies[index.min(self.replies.len() - 1)] {
                Ok(sql) => Ok(sql.to_string()),
                Err(msg) => Err(ProviderError::Timeout(msg.to_string())),
            }
        }
    }

    fn pipeline() -> TextToSqlPipeline {
        TextToSqlPipeline::new(ProviderRegistry::new())
    }

    #[test]
    fn test_first_attempt_success() {
        let generator = Scripted::new(vec![Ok("SELECT COUNT(*) FROM tracks;")]);
        let db = FakeDb { fail_execution: false };
        let output = pipeline().run_with("How many tracks are there?", &generator, &db).unwrap();

        assert_eq!(output.attempts, 1);
        assert_eq!(output.summary, "Found 1 results");
        assert_eq!(generator.seen.borrow().len(), 1);
        assert!(generator.seen.borrow()[0].previous_error().is_none());
    }

    #[test]
    fn test_repair_after_unknown_table() {
        let generator = Scripted::new(vec![
            Ok("SELECT COUNT(*) FROM track"),
            Ok("SELECT COUNT(*) FROM tracks"),
        ]);
        let db = FakeDb { fail_execution: false };
        let output = pipeline().run_with("How many tracks are there?", &generator, &db).unwrap();

        assert_eq!(output.attempts, 2);
        let seen = generator.seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].previous_sql(), Some("SELECT COUNT(*) FROM track"));
        assert_eq!(seen[1].previous_error(), Some("unknown table: track"));
        assert!(seen[1]
            .question()
            .ends_with("Previous SQL was invalid: unknown table: track. Please fix the SQL."));
    }

    #[test]
    fn test_execution_failure_exhausts_budget() {
        let generator = Scripted::new(vec![Ok("SELECT FOO(id) FROM tracks")]);
        let db = FakeDb { fail_execution: true };
        let err = pipeline().run_with("How many tracks are there?", &generator, &db).unwrap_err();

        assert!(matches!(err, PipelineError::ExecutionFailed(ref m) if m == "no such function: FOO"));
        assert_eq!(generator.seen.borrow().len(), MAX_ATTEMPTS as usize);
    }

    #[test]
    fn test_generator_failure_is_attempt_ending() {
        let generator = Scripted::new(vec![Err("openai"), Ok("SELECT name FROM tracks")]);
        let db = FakeDb { fail_execution: false };
        let output = pipeline().run_with("List every track name please", &generator, &db).unwrap();
        assert_eq!(output.attempts, 2);
        assert_eq!(
            generator.seen.borrow()[1].previous_error(),
            Some("openai provider error: request timed out")
        );

        let generator = Scripted::new(vec![Err("openai")]);
        let err = pipeline().run_with("List every track name please", &generator, &db).unwrap_err();
        assert!(matches!(err, PipelineError::GenerationFailed(_)));
    }

    #[test]
    fn test_vague_question_is_clarified_every_attempt() {
        let generator = Scripted::new(vec![Ok("DELETE FROM tracks")]);
        let db = FakeDb { fail_execution: false };
        let _ = pipeline().run_with("show data", &generator, &db);

        for ctx in generator.seen.borrow().iter() {
            assert!(ctx.question().contains(crate::prompting::CLARIFY_INSTRUCTION));
        }
    }

    #[test]
    fn test_unknown_provider() {
        let db = FakeDb { fail_execution: false };
        let err = pipeline().run("How many tracks?", "nope", &db).unwrap_err();
        assert!(matches!(err, PipelineError::GeneratorUnavailable(_)));
    }
}
