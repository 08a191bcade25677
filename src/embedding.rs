//! Embedding provider abstraction and the Gemini implementation.
//!
//! The pipeline never talks to the embedding API directly; it goes through
//! [`embed_texts`] / [`embed_query`], which dispatch on the configured
//! provider. The API key is supplied per call by the surrounding
//! application and never stored here.
//!
//! Failure classes are kept distinct so callers can report them usefully:
//! - 401/403 → authentication failure, no retry;
//! - 429 → quota/rate limit, retried with backoff, reported as quota
//!   exhaustion once retries run out;
//! - 5xx and network errors → retried with backoff;
//! - a response missing vectors → malformed-response error.
//!
//! Also home to the vector utilities shared with the index:
//! [`vec_to_blob`], [`blob_to_vec`], and [`cosine_similarity`].

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::EmbeddingConfig;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Metadata interface all embedding backends implement. The embedding call
/// itself is a free function ([`embed_texts`]) dispatching on config.
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, recorded in the index artifact for compatibility
    /// checks (e.g. `"models/embedding-001"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
}

/// No-op provider used when embeddings are not configured. Every embed
/// attempt fails with a descriptive error.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

/// Embedding provider backed by the Gemini embeddings API.
pub struct GeminiProvider {
    model: String,
    dims: usize,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            model: config.model.clone(),
            dims: config.dims,
        }
    }
}

impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// Instantiate the provider named in the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "gemini" => Ok(Box::new(GeminiProvider::new(config))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a batch of texts, returning one vector per input in input order.
///
/// The whole slice goes out as a single API call; callers batch with
/// `config.batch_size`.
pub async fn embed_texts(
    config: &EmbeddingConfig,
    api_key: &str,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "gemini" => embed_gemini(config, api_key, texts).await,
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a single query string (for retrieval).
pub async fn embed_query(config: &EmbeddingConfig, api_key: &str, text: &str) -> Result<Vec<f32>> {
    let results = embed_texts(config, api_key, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Call the Gemini `batchEmbedContents` endpoint with retry/backoff.
async fn embed_gemini(
    config: &EmbeddingConfig,
    api_key: &str,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if api_key.is_empty() {
        bail!("Gemini API key is required for embedding");
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let url = format!("{}/{}:batchEmbedContents", GEMINI_API_BASE, config.model);

    let requests: Vec<serde_json::Value> = texts
        .iter()
        .map(|t| {
            serde_json::json!({
                "model": config.model,
                "content": { "parts": [{ "text": t }] },
            })
        })
        .collect();
    let body = serde_json::json!({ "requests": requests });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_batch_response(&json, texts.len());
                }

                // Authentication problems never get better by retrying.
                if status.as_u16() == 401 || status.as_u16() == 403 {
                    let body_text = response.text().await.unwrap_or_default();
                    bail!(
                        "Gemini embedding authentication failed ({}): {}",
                        status,
                        body_text
                    );
                }

                // Rate limited or server error — retry.
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(if status.as_u16() == 429 {
                        anyhow::anyhow!("Gemini embedding quota exhausted (429): {}", body_text)
                    } else {
                        anyhow::anyhow!("Gemini API error {}: {}", status, body_text)
                    });
                    continue;
                }

                // Other client errors — don't retry.
                let body_text = response.text().await.unwrap_or_default();
                bail!("Gemini API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
}

/// Extract `embeddings[].values` from a batchEmbedContents response,
/// checking one vector came back per input.
fn parse_batch_response(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("embeddings")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Malformed embedding response: missing embeddings array"))?;

    let mut vectors = Vec::with_capacity(data.len());
    for item in data {
        let values = item
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("Malformed embedding response: missing values"))?;
        let vec: Vec<f32> = values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        vectors.push(vec);
    }

    if vectors.len() != expected {
        bail!(
            "Malformed embedding response: got {} vectors for {} inputs",
            vectors.len(),
            expected
        );
    }

    Ok(vectors)
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`] back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Empty or mismatched vectors score 0.
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
