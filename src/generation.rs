//! Text-generation provider abstraction.
//!
//! The analysis pipeline consumes generation as a black box behind
//! [`TextGenerator`]. Two HTTP backends are provided: an OpenAI-compatible
//! chat endpoint and a local Ollama instance.
//!
//! Retry strategy, shared by both backends:
//! - HTTP 429 and 5xx → transient, retried with exponential backoff
//!   (1s, 2s, 4s, … capped at 32s) up to `max_retries` attempts
//! - other 4xx → permanent, fails immediately
//! - network errors and timeouts → transient

use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Produce text for a prompt. Transient failures have already been
    /// retried when this returns an error.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Instantiate the generator named by the configuration.
pub fn create_generator(
    config: &GenerationConfig,
) -> Result<Box<dyn TextGenerator>, GenerationError> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config.clone()))),
        other => Err(GenerationError::Permanent(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client, GenerationError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GenerationError::Permanent(e.to_string()))
}

/// Run `send` up to `max_retries + 1` times, classifying responses into
/// transient (retry) and permanent (fail now) per the module policy.
async fn request_with_backoff(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, String)],
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value, GenerationError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(attempt)).await;
        }

        let mut req = client.post(url).json(body);
        for (name, value) in headers {
            req = req.header(*name, value);
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| GenerationError::Permanent(format!("{}: {}", label, e)));
                }

                let text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(GenerationError::Transient(format!(
                        "{} returned {}: {}",
                        label, status, text
                    )));
                    continue;
                }
                return Err(GenerationError::Permanent(format!(
                    "{} returned {}: {}",
                    label, status, text
                )));
            }
            Err(e) => {
                last_err = Some(GenerationError::Transient(format!("{}: {}", label, e)));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| GenerationError::Transient(format!("{}: retries exhausted", label))))
}

// ============ OpenAI-compatible backend ============

pub struct OpenAiGenerator {
    config: GenerationConfig,
    api_key: String,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            GenerationError::Permanent("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self {
            config: config.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let base = self
            .config
            .url
            .as_deref()
            .unwrap_or("https://api.openai.com");
        let url = format!("{}/v1/chat/completions", base.trim_end_matches('/'));
        let client = build_client(self.config.timeout_secs)?;

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        let headers = [("Authorization", format!("Bearer {}", self.api_key))];

        let json = request_with_backoff(
            &client,
            &url,
            &headers,
            &body,
            self.config.max_retries,
            "OpenAI chat API",
        )
        .await?;

        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GenerationError::Permanent("invalid chat response: missing content".to_string())
            })
    }
}

// ============ Ollama backend ============

pub struct OllamaGenerator {
    config: GenerationConfig,
}

impl OllamaGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let base = self.config.url.as_deref().unwrap_or("http://localhost:11434");
        let url = format!("{}/api/generate", base.trim_end_matches('/'));
        let client = build_client(self.config.timeout_secs)?;

        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
        });

        let json = request_with_backoff(
            &client,
            &url,
            &[],
            &body,
            self.config.max_retries,
            "Ollama generate API",
        )
        .await?;

        json.get("response")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GenerationError::Permanent("invalid Ollama response: missing response".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_curve_is_capped() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(6), Duration::from_secs(32));
        assert_eq!(backoff_delay(20), Duration::from_secs(32));
    }

    #[test]
    fn unknown_provider_is_permanent() {
        let config = GenerationConfig {
            provider: "litellm".to_string(),
            ..GenerationConfig::default()
        };
        let err = create_generator(&config).err().unwrap();
        assert!(!err.is_transient());
    }
}
