//! In-memory [`Store`] implementation for tests and library embedders.
//!
//! Uses a `HashMap` behind `std::sync::RwLock` for thread safety. Search is
//! brute-force cosine similarity over every embedded item.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::embedding::cosine_similarity;
use crate::models::{Item, StoreStats};
use crate::search::{count_categories, item_field, rank_rows, FieldValue, SearchOptions, SearchRow, SCORE_FIELD};

use super::Store;

/// In-memory store keyed by full name.
///
/// `get_*` methods return items in insertion order.
pub struct InMemoryStore {
    items: RwLock<HashMap<String, Item>>,
    order: RwLock<Vec<String>>,
    dims: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            dims: None,
        }
    }

    /// A store that rejects embeddings of any other length.
    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims: Some(dims),
            ..Self::new()
        }
    }

    /// Fetch one item by key.
    pub fn get(&self, full_name: &str) -> Option<Item> {
        self.items.read().unwrap().get(full_name).cloned()
    }

    fn collect(&self, keep: impl Fn(&Item) -> bool) -> Vec<Item> {
        let items = self.items.read().unwrap();
        self.order
            .read()
            .unwrap()
            .iter()
            .filter_map(|k| items.get(k))
            .filter(|i| keep(*i))
            .cloned()
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn merge(stored: &mut Item, incoming: &Item) {
    stored.owner = incoming.owner.clone();
    stored.name = incoming.name.clone();
    stored.url = incoming.url.clone();
    stored.stars = incoming.stars;
    stored.topics = incoming.topics.clone();

    fn keep_or_set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
        if value.is_some() {
            *slot = value.clone();
        }
    }
    keep_or_set(&mut stored.description, &incoming.description);
    keep_or_set(&mut stored.homepage_url, &incoming.homepage_url);
    keep_or_set(&mut stored.language, &incoming.language);
    keep_or_set(&mut stored.readme_excerpt, &incoming.readme_excerpt);
    keep_or_set(&mut stored.ai_summary, &incoming.ai_summary);
    keep_or_set(&mut stored.ai_categories, &incoming.ai_categories);
    keep_or_set(&mut stored.fetched_at, &incoming.fetched_at);
    keep_or_set(&mut stored.enriched_at, &incoming.enriched_at);
}

#[async_trait]
impl Store for InMemoryStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_item(&self, item: &Item) -> Result<()> {
        let mut items = self.items.write().unwrap();
        match items.get_mut(&item.full_name) {
            Some(stored) => merge(stored, item),
            None => {
                let mut fresh = item.clone();
                fresh.embedding = None;
                items.insert(item.full_name.clone(), fresh);
                self.order.write().unwrap().push(item.full_name.clone());
            }
        }
        Ok(())
    }

    async fn get_unenriched(&self) -> Result<Vec<Item>> {
        Ok(self.collect(|i| !i.is_enriched()))
    }

    async fn get_needing_embedding(&self) -> Result<Vec<Item>> {
        Ok(self.collect(|i| i.is_enriched() && !i.is_embedded()))
    }

    async fn get_all(&self) -> Result<Vec<Item>> {
        Ok(self.collect(|_| true))
    }

    async fn update_enrichment(
        &self,
        full_name: &str,
        summary: &str,
        categories: &[String],
    ) -> Result<()> {
        let mut items = self.items.write().unwrap();
        if let Some(item) = items.get_mut(full_name) {
            item.ai_summary = Some(summary.to_string());
            item.ai_categories = Some(categories.to_vec());
            item.enriched_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_embedding(&self, full_name: &str, vector: &[f32]) -> Result<()> {
        if let Some(dims) = self.dims {
            if vector.len() != dims {
                bail!(
                    "embedding for {} has {} dimensions, expected {}",
                    full_name,
                    vector.len(),
                    dims
                );
            }
        }
        let mut items = self.items.write().unwrap();
        if let Some(item) = items.get_mut(full_name) {
            item.embedding = Some(vector.to_vec());
        }
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], options: &SearchOptions) -> Result<Vec<SearchRow>> {
        options.validate()?;
        let columns = options.columns();

        let rows: Vec<SearchRow> = self
            .collect(Item::is_embedded)
            .iter()
            .map(|item| {
                let mut row = SearchRow::new();
                for col in &columns {
                    row.insert(*col, item_field(item, col));
                }
                let score = item
                    .embedding
                    .as_deref()
                    .map(|v| cosine_similarity(query_vec, v) as f64)
                    .unwrap_or(0.0);
                row.insert(SCORE_FIELD, FieldValue::Float(score));
                row
            })
            .collect();

        Ok(rank_rows(rows, options))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let items = self.items.read().unwrap();
        Ok(StoreStats {
            total: items.len() as u64,
            enriched: items.values().filter(|i| i.is_enriched()).count() as u64,
            embedded: items.values().filter(|i| i.is_embedded()).count() as u64,
        })
    }

    async fn category_breakdown(&self) -> Result<HashMap<String, u64>> {
        let items = self.items.read().unwrap();
        Ok(count_categories(
            items
                .values()
                .filter_map(|i| i.ai_categories.as_deref()),
        ))
    }
}
