//! Local Ollama generator (`/api/chat`, non-streaming)

use super::{clean_model_output, SqlGenerator};
use crate::config::Settings;
use crate::db::Rows;
use crate::error::ProviderError;
use crate::prompting::{build_sql_prompt, GenerationContext};
use reqwest::blocking::Client;
use serde_json::json;
use tracing::debug;

const PROVIDER: &str = "ollama";

pub struct OllamaGenerator {
    client: Client,
    host: String,
    model: String,
}

impl OllamaGenerator {
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: settings.ollama_host.trim_end_matches('/').to_string(),
            model: settings.ollama_model.clone(),
        })
    }
}

impl SqlGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn generate_sql(&self, ctx: &GenerationContext) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": build_sql_prompt(ctx)}
            ],
            "stream": false,
            "options": {"temperature": 0, "num_predict": 200}
        });

        debug!("Calling {} model {} at {}", PROVIDER, self.model, self.host);
        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(PROVIDER.to_string())
                } else {
                    ProviderError::Request {
                        provider: PROVIDER.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Request {
                provider: PROVIDER.to_string(),
                message: format!("HTTP {}: {}", status, response.text().unwrap_or_default().trim()),
            });
        }

        let reply: serde_json::Value = response.json().map_err(|e| ProviderError::Request {
            provider: PROVIDER.to_string(),
            message: format!("invalid response body: {}", e),
        })?;
        let content = reply["message"]["content"]
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
