//! Feedback log
//!
//! Append-only JSON-lines store of user votes and corrections. Recent
//! corrections and upvoted answers are turned back into few-shot examples for
//! later runs; callers load them and hand them to the pipeline.

use crate::error::Result;
use crate::prompting::ExamplePair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default number of examples injected into a prompt.
pub const DEFAULT_MAX_EXAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub ts: DateTime<Utc>,
    pub question: String,
    pub provider: String,
    pub sql: String,
    /// Number of rows the answer returned
    pub rows: usize,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Vote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
}

impl FeedbackEntry {
    pub fn new(
        question: impl Into<String>,
        provider: impl Into<String>,
        sql: impl Into<String>,
        rows: usize,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            ts: Utc::now(),
            question: question.into(),
            provider: provider.into(),
            sql: sql.into(),
            rows,
            summary: summary.into(),
            feedback: None,
            correction: None,
        }
    }

    pub fn with_vote(mut self, vote: Vote) -> Self {
        self.feedback = Some(vote);
        self
    }

    pub fn with_correction(mut self, correction: impl Into<String>) -> Self {
        self.correction = Some(correction.into()).filter(|c: &String| !c.trim().is_empty());
        self
    }

    /// Few-shot example this entry contributes, if any.
    fn as_example(&self) -> Option<ExamplePair> {
        if let Some(correction) = &self.correction {
            return Some(ExamplePair::new(self.question.as_str(), correction.as_str()));
        }
        if self.feedback == Some(Vote::Up) && !self.sql.trim().is_empty() {
            return Some(ExamplePair::new(self.question.as_str(), self.sql.as_str()));
        }
        None
    }
}

pub struct FeedbackLog {
    path: PathBuf,
}

impl FeedbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. Returns `false` when the entry carries neither a vote
    /// nor a correction and was skipped.
    pub fn append(&self, entry: &FeedbackEntry) -> Result<bool> {
        if entry.feedback.is_none() && entry.correction.is_none() {
            debug!("Skipping feedback entry without vote or correction");
            return Ok(false);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        Ok(true)
    }

    /// The most recent `max` example pairs, oldest first. A missing log yields
    /// no examples; malformed lines are skipped.
    pub fn load_examples(&self, max: usize) -> Result<Vec<ExamplePair>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let mut examples: Vec<ExamplePair> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<FeedbackEntry>(line) {
                Ok(entry) => entry.as_example(),
                Err(e) => {
                    warn!("Skipping malformed feedback line: {}", e);
                    None
                }
            })
            .collect();

        let skip = examples.len().saturating_sub(max);
        Ok(examples.split_off(skip))
    }
}
