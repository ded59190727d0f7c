//! OpenAI chat-completions generator

use super::{clean_model_output, SqlGenerator};
use crate::config::Settings;
use crate::db::Rows;
use crate::error::ProviderError;
use crate::prompting::{build_sql_prompt, GenerationContext};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

const PROVIDER: &str = "openai";

pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiGenerator {
    /// Fails with `Unavailable` when no API key is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let api_key = settings.openai_api_key.clone().ok_or_else(|| {
            ProviderError::Unavailable("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
            model: settings.openai_model.clone(),
        })
    }

    fn request_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            return ProviderError::Timeout(PROVIDER.to_string());
        }
        ProviderError::Request {
            provider: PROVIDER.to_string(),
            message: e.to_string(),
        }
    }
}

/// Map a non-success HTTP reply onto the provider error taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> ProviderError {
    let lowered = body.to_lowercase();
    if status == StatusCode::UNAUTHORIZED || lowered.contains("unauthorized") {
        return ProviderError::Unauthorized(PROVIDER.to_string());
    }
    if status == StatusCode::TOO_MANY_REQUESTS
        || lowered.contains("quota")
        || lowered.contains("rate_limit")
    {
        return ProviderError::QuotaExceeded(PROVIDER.to_string());
    }
    ProviderError::Request {
        provider: PROVIDER.to_string(),
        message: format!("HTTP {}: {}", status, body.trim()),
    }
}

impl SqlGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn generate_sql(&self, ctx: &GenerationContext) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": build_sql_prompt(ctx)}
            ],
            "temperature": 0,
            "max_tokens": 200
        });

        debug!("Calling {} model {}", PROVIDER, self.model);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(Self::request_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        let reply: serde_json::Value = response.json().map_err(Self::request_error)?;
        let content = reply["choices"][0]["message"]["content"]
            .as_str()
            .map(clean_model_output)
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ProviderError::EmptyResponse(PROVIDER.to_string()));
        }
        Ok(content)
    }

    fn summarize(&self, question: &str, rows: &Rows) -> String {
        format!("Found {} results for: {}", rows.len(), question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_unavailable() {
        let err = OpenAiGenerator::from_settings(&Settings::default()).err().unwrap();
        assert_eq!(err.to_string(), "OPENAI_API_KEY environment variable not set");
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, ""),
            ProviderError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, r#"{"error":{"code":"insufficient_quota"}}"#),
            ProviderError::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "upstream"),
            ProviderError::Request { .. }
        ));
    }

    #[test]
    fn test_summary_mentions_question() {
        let mut settings = Settings::default();
        settings.openai_api_key = Some("sk-test".to_string());
        let generator = OpenAiGenerator::from_settings(&settings).unwrap();
        assert_eq!(
            generator.summarize("How many tracks?", &vec![vec![]]),
            "Found 1 results for: How many tracks?"
        );
    }
}
