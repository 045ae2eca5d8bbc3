//! OpenAI-compatible embedding provider.
//!
//! Calls `POST {base_url}/embeddings` and returns each vector tagged with the
//! `index` the provider reported, so that callers can realign results that
//! arrive out of order. Requires `EMBEDDING_API_KEY` (or `LLM_API_KEY`).
//!
//! Retries follow the shared strategy in [`crate::http`].

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use star_sync_core::embedding::{Embedder, IndexedVector};

use crate::config::EmbeddingConfig;
use crate::http;

/// Embedding provider using an OpenAI-compatible API.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    url: String,
    /// Model name (e.g. `"text-embedding-3-small"`).
    model: String,
    /// Vector dimensionality every returned vector must have.
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    /// Build from config, reading `EMBEDDING_API_KEY` (falling back to
    /// `LLM_API_KEY`) from the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = http::env_with_fallback("EMBEDDING_API_KEY", "LLM_API_KEY")?;
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            api_key,
            url: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }

    /// `text-embedding-3-*` models can shorten their output to `dims`.
    fn request_body(&self, texts: &[String]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        if self.model.starts_with("text-embedding-3") {
            body["dimensions"] = serde_json::json!(self.dims);
        }
        body
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<IndexedVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = self.request_body(texts);

        let response = http::send_with_retry("Embedding", self.max_retries, || {
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let json: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse embeddings response")?;
        parse_embeddings_response(&json, self.dims)
    }
}

/// Stand-in used when a sync makes no AI calls. Every call fails.
pub struct DisabledEmbedder {
    dims: usize,
}

impl DisabledEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<IndexedVector>> {
        Err(anyhow!("embedder is disabled ({} texts not embedded)", texts.len()))
    }
}

/// Embed a single query text.
///
/// Convenience wrapper around [`Embedder::embed`] for semantic search.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .find(|v| v.index == 0)
        .map(|v| v.vector)
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

/// Parse the embeddings API response JSON.
///
/// Extracts `data[].{index, embedding}`; every vector must have `dims`
/// components.
fn parse_embeddings_response(json: &serde_json::Value, dims: usize) -> Result<Vec<IndexedVector>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid embeddings response: missing data array"))?;

    let mut out = Vec::with_capacity(data.len());

    for (pos, item) in data.iter().enumerate() {
        // Providers that omit `index` return data in input order.
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);

        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid embeddings response: missing embedding"))?;

        let vector = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| anyhow!("Invalid embeddings response: non-numeric component"))
            })
            .collect::<Result<Vec<f32>>>()?;

        if vector.len() != dims {
            bail!(
                "embedding at index {} has {} dimensions, expected {}",
                index,
                vector.len(),
                dims
            );
        }

        out.push(IndexedVector { index, vector });
    }

    Ok(out)
}
