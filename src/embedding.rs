//! Embedding provider abstraction and vector utilities.
//!
//! Retrieval consumes embeddings as a black box behind [`Embedder`]. Two
//! HTTP backends are provided (OpenAI embeddings API, Ollama `/api/embed`),
//! sharing the transient/permanent retry policy of the generation module.
//!
//! Vectors are stored as little-endian `f32` BLOBs; [`vec_to_blob`] and
//! [`blob_to_vec`] convert, and [`cosine_similarity`] is the configured
//! distance metric for search.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::GenerationError;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    /// Fixed dimensionality per deployment.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let vectors = embedder.embed(&[text.to_string()]).await?;
    ensure_dims(embedder.dims(), &vectors)?;
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("empty embedding response"))
}

/// Every vector in a batch must match the declared dimensionality. A
/// mismatch means the configured `embedding.dims` does not match the model
/// actually serving, which would otherwise degrade to zero similarity
/// scores instead of an error.
pub fn ensure_dims(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    for vector in vectors {
        if vector.len() != expected {
            return Err(anyhow!(
                "embedding dimensionality mismatch: expected {}, got {} (check embedding.dims)",
                expected,
                vector.len()
            ));
        }
    }
    Ok(())
}

/// Instantiate the embedder named by the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config.clone()))),
        other => Err(anyhow!("unknown embedding provider: {}", other)),
    }
}

async fn post_with_backoff(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, String)],
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err: Option<GenerationError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut req = client.post(url).json(body);
        for (name, value) in headers {
            req = req.header(*name, value);
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.json().await?);
                }
                let text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(GenerationError::Transient(format!(
                        "{} returned {}: {}",
                        label, status, text
                    )));
                    continue;
                }
                return Err(
                    GenerationError::Permanent(format!("{} returned {}: {}", label, status, text))
                        .into(),
                );
            }
            Err(e) => {
                last_err = Some(GenerationError::Transient(format!("{}: {}", label, e)));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| GenerationError::Transient(format!("{}: retries exhausted", label)))
        .into())
}

// ============ OpenAI backend ============

pub struct OpenAiEmbedder {
    config: EmbeddingConfig,
    api_key: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            config: config.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn dims(&self) -> usize {
        self.config.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let base = self
            .config
            .url
            .as_deref()
            .unwrap_or("https://api.openai.com");
        let url = format!("{}/v1/embeddings", base.trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });
        let headers = [("Authorization", format!("Bearer {}", self.api_key))];

        let json = post_with_backoff(
            &client,
            &url,
            &headers,
            &body,
            self.config.max_retries,
            "OpenAI embeddings API",
        )
        .await?;

        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow!("invalid embeddings response: missing data array"))?;

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let values = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| anyhow!("invalid embeddings response: missing embedding"))?;
            vectors.push(
                values
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                    .collect(),
            );
        }
        Ok(vectors)
    }
}

// ============ Ollama backend ============

pub struct OllamaEmbedder {
    config: EmbeddingConfig,
}

impl OllamaEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn dims(&self) -> usize {
        self.config.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let base = self.config.url.as_deref().unwrap_or("http://localhost:11434");
        let url = format!("{}/api/embed", base.trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });

        let json = post_with_backoff(
            &client,
            &url,
            &[],
            &body,
            self.config.max_retries,
            "Ollama embed API",
        )
        .await?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("invalid Ollama response: missing embeddings array"))?;

        let mut vectors = Vec::with_capacity(embeddings.len());
        for values in embeddings {
            let values = values
                .as_array()
                .ok_or_else(|| anyhow!("invalid Ollama response: embedding is not an array"))?;
            vectors.push(
                values
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                    .collect(),
            );
        }
        Ok(vectors)
    }
}

// ============ Vector utilities ============

/// Encode a vector as little-endian `f32` bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty or mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
