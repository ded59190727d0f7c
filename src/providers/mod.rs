//! SQL generator backends
//!
//! The pipeline depends only on [`SqlGenerator`]. Each backend (rule-based or
//! remote model) is one implementation; [`ProviderRegistry`] resolves a backend
//! by name.

pub mod naive;
pub mod ollama;
pub mod openai;

pub use naive::NaiveGenerator;
pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;

use crate::config::Settings;
use crate::db::Rows;
use crate::error::{PipelineError, ProviderError, Result};
use crate::prompting::GenerationContext;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::warn;

/// Natural-language to SQL capability.
pub trait SqlGenerator {
    /// Registry name, e.g. `naive`
    fn name(&self) -> &str;

    /// Produce raw SQL text for the context's question. Any error ends the
    /// current attempt; no retrying happens inside this call.
    fn generate_sql(&self, ctx: &GenerationContext) -> std::result::Result<String, ProviderError>;

    /// Short human-readable description of a result set.
    fn summarize(&self, _question: &str, rows: &Rows) -> String {
        format!("Found {} results", rows.len())
    }
}

/// Named generators, plus the reasons the unavailable built-ins failed to
/// initialize.
#[derive(Default)]
pub struct ProviderRegistry {
    generators: BTreeMap<String, Box<dyn SqlGenerator>>,
    unavailable: BTreeMap<String, String>,
}

impl ProviderRegistry {
    /// Empty registry; see [`ProviderRegistry::from_settings`] for the built-ins.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(NaiveGenerator::new()));

        match OpenAiGenerator::from_settings(settings) {
            Ok(generator) => registry.register(Box::new(generator)),
            Err(e) => registry.mark_unavailable("openai", e.to_string()),
        }
        match OllamaGenerator::from_settings(settings) {
            Ok(generator) => registry.register(Box::new(generator)),
            Err(e) => registry.mark_unavailable("ollama", e.to_string()),
        }

        registry
    }

    /// Register under `generator.name()`, replacing any previous entry.
    pub fn register(&mut self, generator: Box<dyn SqlGenerator>) {
        let name = generator.name().to_string();
        self.unavailable.remove(&name);
        self.generators.insert(name, generator);
    }

    pub fn mark_unavailable(&mut self, name: &str, reason: impl Into<String>) {
        self.unavailable.insert(name.to_string(), reason.into());
    }

    pub fn get(&self, name: &str) -> Result<&dyn SqlGenerator> {
        if let Some(generator) = self.generators.get(name) {
            return Ok(generator.as_ref());
        }

        let reason = self
            .unavailable
            .get(name)
            .map(|r| format!("{} ({})", name, r))
            .unwrap_or_else(|| format!("{} (not registered)", name));
        warn!("Generator lookup failed: {}", reason);
        Err(PipelineError::GeneratorUnavailable(reason))
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    pub fn available(&self) -> Vec<&str> {
        self.generators.keys().map(String::as_str).collect()
    }
}

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)\s*```").unwrap();
    static ref THINK_BLOCK: Regex = Regex::new(r"(?s)<think>.*?</think>").unwrap();
}

/// Extract SQL from a model reply: drops reasoning blocks and markdown fences.
pub(crate) fn clean_model_output(text: &str) -> String {
    let without_thinking = THINK_BLOCK.replace_all(text, "");
    let body = match CODE_FENCE.captures(&without_thinking) {
        Some(caps) => caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
        None => without_thinking.to_string(),
    };
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl SqlGenerator for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate_sql(&self, _ctx: &GenerationContext) -> std::result::Result<String, ProviderError> {
            Ok("SELECT 1".to_string())
        }
    }

    #[test]
    fn test_default_summary() {
        let rows: Rows = vec![vec![], vec![]];
        assert_eq!(Fixed.summarize("anything", &rows), "Found 2 results");
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ProviderRegistry::new();
        registry.mark_unavailable("fixed", "missing key");
        assert!(matches!(
            registry.get("fixed"),
            Err(PipelineError::GeneratorUnavailable(reason)) if reason == "fixed (missing key)"
        ));

        registry.register(Box::new(Fixed));
        assert!(registry.get("fixed").is_ok());
        assert_eq!(registry.available(), vec!["fixed"]);

        assert!(matches!(
            registry.get("gpt"),
            Err(PipelineError::GeneratorUnavailable(reason)) if reason == "gpt (not registered)"
        ));
    }

    #[test]
    fn test_builtin_registry_without_key() {
        let registry = ProviderRegistry::from_settings(&Settings::default());
        assert!(registry.is_available("naive"));
        assert!(!registry.is_available("openai"));
        assert!(registry.get("openai").is_err());
    }

    #[test]
    fn test_clean_model_output() {
        assert_eq!(
            clean_model_output("```sql\nSELECT COUNT(*) FROM tracks;\n```"),
            "SELECT COUNT(*) FROM tracks;"
        );
        assert_eq!(
            clean_model_output("<think>count them</think>\nSELECT 1"),
            "SELECT 1"
        );
        assert_eq!(clean_model_output("  SELECT 2  "), "SELECT 2");
    }
}
