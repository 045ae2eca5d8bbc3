//! Summarizer trait and response parsing.

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::{Enrichment, Item};

/// Produces an AI summary and category tags for one item.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `item` from its name, description, and README excerpt.
    ///
    /// Fails on a transport error or when the provider's reply does not
    /// parse into an [`Enrichment`].
    async fn summarize(&self, item: &Item) -> Result<Enrichment>;
}

/// Parse a model reply into an [`Enrichment`].
///
/// Some models wrap JSON in markdown code fences even when told not to; the
/// fences are stripped first.
pub fn parse_enrichment(content: &str) -> Result<Enrichment> {
    let body = strip_code_fences(content);
    serde_json::from_str(body).with_context(|| format!("unparseable summary payload: {}", body))
}

/// Remove a surrounding ```` ``` ```` / ```` ```json ```` fence, if present.
pub fn strip_code_fences(s: &str) -> &str {
    let s = s.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    let rest = match rest.rfind("```") {
        Some(i) => &rest[..i],
        None => rest,
    };
    rest.trim()
}
