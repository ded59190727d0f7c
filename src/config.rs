//! Runtime settings
//!
//! Read from the process environment. The binary loads `.env` with `dotenv`
//! before calling [`Settings::from_env`]; CLI flags override individual fields.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "data/demo_music.sqlite";
pub const DEFAULT_FEEDBACK_PATH: &str = "eval/feedback.jsonl";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Default SQLite database (`SQLITE_DB_PATH`)
    pub db_path: PathBuf,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub ollama_host: String,
    pub ollama_model: String,
    /// Append-only feedback log (`FEEDBACK_LOG_PATH`)
    pub feedback_path: PathBuf,
    /// Deadline applied by the remote generators to each HTTP call
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            ollama_host: "http://localhost:11434".to_string(),
            ollama_model: "qwen3:1.7b".to_string(),
            feedback_path: PathBuf::from(DEFAULT_FEEDBACK_PATH),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout_secs = env::var("TEXT2SQL_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(defaults.request_timeout.as_secs());

        Self {
            db_path: env::var("SQLITE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_base_url: env::var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            ollama_host: env::var("OLLAMA_HOST").unwrap_or(defaults.ollama_host),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            feedback_path: env::var("FEEDBACK_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.feedback_path),
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }
}
