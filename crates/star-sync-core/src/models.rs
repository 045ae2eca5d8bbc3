//! Core data models shared by the sync pipeline and every store backend.
//!
//! An [`Item`] is one starred repository. Source attributes come from the
//! remote star list; enrichment attributes are written back by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum README excerpt length, in characters.
pub const README_EXCERPT_MAX_CHARS: usize = 3000;

/// One starred repository, keyed by `full_name` (`owner/name`).
///
/// The same shape is used for the local cache snapshot, for store rows, and
/// for items handed to the summarizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub owner: String,
    pub name: String,
    /// `owner/name`; the idempotence key for every store write.
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    #[serde(default)]
    pub homepage_url: Option<String>,
    #[serde(default)]
    pub stars: i64,
    #[serde(default)]
    pub language: Option<String>,
    /// Ordered topic tags. May be empty, never absent.
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub readme_excerpt: Option<String>,
    #[serde(default)]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub ai_categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub enriched_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Build an item with only its identity and URL set.
    pub fn new(owner: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        let owner = owner.into();
        let name = name.into();
        Self {
            full_name: format!("{}/{}", owner, name),
            owner,
            name,
            description: None,
            url: url.into(),
            homepage_url: None,
            stars: 0,
            language: None,
            topics: Vec::new(),
            readme_excerpt: None,
            ai_summary: None,
            ai_categories: None,
            embedding: None,
            fetched_at: None,
            enriched_at: None,
        }
    }

    /// An item is enriched iff it carries an AI summary.
    pub fn is_enriched(&self) -> bool {
        self.ai_summary.is_some()
    }

    /// An item is embedded iff it carries an embedding vector.
    pub fn is_embedded(&self) -> bool {
        self.embedding.is_some()
    }

    /// Text fed to the embedder: `"{full_name}: {summary}"`.
    pub fn embedding_input(&self) -> String {
        format!(
            "{}: {}",
            self.full_name,
            self.ai_summary.as_deref().unwrap_or_default()
        )
    }
}

/// Truncate a README body to [`README_EXCERPT_MAX_CHARS`] characters.
///
/// Returns `None` for empty text so that an empty README never overwrites a
/// stored excerpt.
pub fn readme_excerpt(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    match text.char_indices().nth(README_EXCERPT_MAX_CHARS) {
        Some((cut, _)) => Some(text[..cut].to_string()),
        None => Some(text.to_string()),
    }
}

/// Cursor and has-more flags for one page, in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
    pub has_previous_page: bool,
    #[serde(default)]
    pub start_cursor: Option<String>,
}

/// One page of the remote star list.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Items in connection order (oldest to newest).
    pub items: Vec<Item>,
    /// Total size of the remote collection, as reported by the source.
    pub total_count: u64,
    pub page_info: PageInfo,
}

/// Summary and categories produced by the summarizer for one item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Enrichment {
    pub summary: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Aggregate counts over the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub enriched: u64,
    pub embedded: u64,
}
