//! Error Classifier
//!
//! Maps pipeline failures onto the benchmark error taxonomy.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Benchmark error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// SQL rejected before reaching the database
    Syntax,
    /// SQL ran but returned rows different from the gold query
    Logic,
    /// Database, generator or environment failure
    Execution,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Syntax => write!(f, "syntax"),
            ErrorClass::Logic => write!(f, "logic"),
            ErrorClass::Execution => write!(f, "execution"),
        }
    }
}

/// Error classifier
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a terminal pipeline failure. `Logic` is never produced here;
    /// it comes from comparing result sets of a successful run.
    pub fn classify(&self, error: &PipelineError) -> ErrorClass {
        match error {
            PipelineError::ValidationFailed(_) => ErrorClass::Syntax,
            // SQLite's own parser can still reject what the validator accepted
            PipelineError::ExecutionFailed(msg) if msg.to_lowercase().contains("syntax error") => {
                ErrorClass::Syntax
            }
            PipelineError::ExecutionFailed(_)
            | PipelineError::GenerationFailed(_)
            | PipelineError::GeneratorUnavailable(_)
            | PipelineError::SchemaUnavailable(_)
            | PipelineError::Io(_)
            | PipelineError::Json(_) => ErrorClass::Execution,
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}
