use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::{DecksmithError, Result},
    record::StructuredRecord,
    schema::RecordType,
};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const OPENROUTER_KEY_ENV: &str = "OPENROUTER_API_KEY";

fn default_model() -> String {
    "openai/gpt-4.1".to_string()
}

fn default_temperature() -> f64 {
    0.3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    pub system_prompt: String,
}

/// Seam for structured-content generation: given item text and a compiled
/// schema, return a validated record.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, item: &str, record_type: &RecordType) -> Result<StructuredRecord>;
}

/// Chat-completions client for OpenRouter-compatible endpoints, requesting
/// structured output against the compiled record schema. No explicit timeout
/// beyond the client default.
pub struct OpenRouterGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    config: LlmConfig,
}

impl OpenRouterGenerator {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            config,
        }
    }

    /// Builds a generator against the default OpenRouter endpoint, reading the
    /// API key from the environment.
    pub fn from_env(config: LlmConfig) -> Result<Self> {
        let api_key = std::env::var(OPENROUTER_KEY_ENV).map_err(|_| {
            DecksmithError::MissingApiKey {
                env_var: OPENROUTER_KEY_ENV.to_string(),
            }
        })?;
        Ok(Self::new(OPENROUTER_BASE_URL, api_key, config))
    }
}

#[async_trait]
impl ContentGenerator for OpenRouterGenerator {
    async fn generate(&self, item: &str, record_type: &RecordType) -> Result<StructuredRecord> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.config.model,
                "temperature": self.config.temperature,
                "messages": [
                    {
                        "role": "system",
                        "content": self.config.system_prompt,
                    },
                    {
                        "role": "user",
                        "content": format!("Generate content for the word {item}."),
                    },
                ],
                "response_format": {
                    "type": "json_schema",
                    "json_schema": {
                        "name": "card_record",
                        "strict": true,
                        "schema": record_type.json_schema(),
                    },
                },
            }))
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| DecksmithError::Generation {
                item: item.to_string(),
                reason: format!("invalid provider response: {response:?}"),
            })?;

        let record: StructuredRecord =
            serde_json::from_str(content).map_err(|err| DecksmithError::Generation {
                item: item.to_string(),
                reason: format!("response is not a conforming record: {err}"),
            })?;

        if let Some(problem) = record.conformance_error(record_type) {
            return Err(DecksmithError::Generation {
                item: item.to_string(),
                reason: problem,
            });
        }

        Ok(record)
    }
}
