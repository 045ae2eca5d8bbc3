//! OpenAI-compatible chat summarizer.
//!
//! Calls `POST {base_url}/chat/completions` once per item with a fixed system
//! prompt and parses the reply into an [`Enrichment`]. Requires
//! `LLM_API_KEY`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use star_sync_core::models::{Enrichment, Item};
use star_sync_core::summarize::{parse_enrichment, Summarizer};

use crate::config::SummarizerConfig;
use crate::http;

/// Category vocabulary offered to the model.
pub const CATEGORIES: &[&str] = &[
    "LLM Framework",
    "Vector Database",
    "ML Training",
    "NLP",
    "Computer Vision",
    "AI Agent",
    "RAG",
    "Model Serving",
    "Data Pipeline",
    "Developer Tool",
    "Library/SDK",
    "Research",
    "Observability",
    "Other",
];

fn system_prompt() -> String {
    format!(
        "You are a technical analyst. Given a GitHub repository's name, description, and README \
         excerpt, produce a JSON object with:\n\n\
         1. \"summary\": A 2-3 sentence summary of what the repo does, its main use case, and why \
         it's notable.\n\
         2. \"categories\": An array of 1-3 categories from this list:\n   {}\n\n\
         Return ONLY valid JSON. No markdown, no code fences.",
        CATEGORIES.join(", ")
    )
}

/// Build the user message: name, then description and README when present.
pub fn user_message(item: &Item) -> String {
    let mut parts = vec![format!("Repository: {}", item.full_name)];
    if let Some(desc) = &item.description {
        parts.push(format!("Description: {}", desc));
    }
    if let Some(readme) = &item.readme_excerpt {
        parts.push(format!("README excerpt:\n{}", readme));
    }
    parts.join("\n\n")
}

/// [`Summarizer`] over an OpenAI-compatible chat completions endpoint.
pub struct OpenAiSummarizer {
    client: Client,
    api_key: String,
    url: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl OpenAiSummarizer {
    /// Build from config, reading `LLM_API_KEY` from the environment.
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let api_key = http::require_env("LLM_API_KEY")?;
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            api_key,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, item: &Item) -> Result<Enrichment> {
        // No response_format: not every compatible provider supports json_object mode.
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system_prompt()},
                {"role": "user", "content": user_message(item)},
            ],
        });

        let response = http::send_with_retry("LLM", self.max_retries, || {
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await
        .with_context(|| format!("LLM call for {}", item.full_name))?;

        let json: serde_json::Value = response.json().await?;
        let content = parse_chat_response(&json)
            .with_context(|| format!("LLM response for {}", item.full_name))?;
        parse_enrichment(content).with_context(|| format!("LLM response for {}", item.full_name))
    }
}

/// A summarizer that always fails; used when enrichment is skipped so that
/// no LLM credentials are required.
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, item: &Item) -> Result<Enrichment> {
        Err(anyhow!("summarizer is disabled (cannot enrich {})", item.full_name))
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value) -> Result<&str> {
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| anyhow!("no choices returned"))?;
    choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow!("Invalid chat response: missing message content"))
}
