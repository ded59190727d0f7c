use crate::validation::ValidationError;
use thiserror::Error;

/// Failures of the text-to-SQL pipeline and the tooling around it.
///
/// `ValidationFailed`, `ExecutionFailed` and `GenerationFailed` are the terminal
/// states of an exhausted retry budget. `GeneratorUnavailable` and
/// `SchemaUnavailable` are configuration-level and never retried.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("validation_failed: {0}")]
    ValidationFailed(ValidationError),

    #[error("execution_error: {0}")]
    ExecutionFailed(String),

    #[error("generation_failed: {0}")]
    GenerationFailed(String),

    #[error("provider not available: {0}")]
    GeneratorUnavailable(String),

    #[error("schema_unavailable: {0}")]
    SchemaUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by a database handle.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Query(String),
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::Query(e.to_string())
    }
}

/// Errors raised by a SQL generator backend. The pipeline treats all of them
/// as the end of the current attempt.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{0}")]
    Unavailable(String),

    #[error("{provider} provider error: {message}")]
    Request { provider: String, message: String },

    #[error("{0} provider error: API returned empty content")]
    EmptyResponse(String),

    #[error("{0} provider error: quota exceeded or rate limited")]
    QuotaExceeded(String),

    #[error("{0} provider error: unauthorized, check the API key")]
    Unauthorized(String),

    #[error("{0} provider error: request timed out")]
    Timeout(String),
}
