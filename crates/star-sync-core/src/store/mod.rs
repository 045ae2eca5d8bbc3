//! Storage abstraction for starred items.
//!
//! The [`Store`] trait defines every durable operation the sync pipeline and
//! the search command need, enabling pluggable backends (SQLite in the app
//! crate, [`memory::InMemoryStore`] here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Item, StoreStats};
use crate::search::{SearchOptions, SearchRow};

/// Abstract storage backend, keyed by [`Item::full_name`].
///
/// Every write is idempotent: repeating it with the same arguments leaves
/// the store unchanged.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`init_schema`](Store::init_schema) | Create tables and record the vector metric |
/// | [`upsert_item`](Store::upsert_item) | Merge source attributes into a row |
/// | [`get_unenriched`](Store::get_unenriched) | Items without an AI summary |
/// | [`get_needing_embedding`](Store::get_needing_embedding) | Enriched items without a vector |
/// | [`update_enrichment`](Store::update_enrichment) | Write summary and categories |
/// | [`update_embedding`](Store::update_embedding) | Write one vector |
/// | [`search`](Store::search) | Cosine similarity over embedded items |
/// | [`stats`](Store::stats) | Totals |
/// | [`category_breakdown`](Store::category_breakdown) | Count per category label |
#[async_trait]
pub trait Store: Send + Sync {
    /// Create the schema if missing. Safe to call on every run.
    async fn init_schema(&self) -> Result<()>;

    /// Insert or merge an item.
    ///
    /// Only present values overwrite: an absent optional field leaves the
    /// stored value untouched. Required fields (`owner`, `name`, `url`,
    /// `stars`, `topics`) always reflect the latest fetch. The embedding is
    /// never written here.
    async fn upsert_item(&self, item: &Item) -> Result<()>;

    /// Items whose AI summary is absent.
    async fn get_unenriched(&self) -> Result<Vec<Item>>;

    /// Items with a summary and no embedding.
    async fn get_needing_embedding(&self) -> Result<Vec<Item>>;

    async fn get_all(&self) -> Result<Vec<Item>>;

    /// Set summary, categories, and the enrichment timestamp.
    ///
    /// Does not touch the embedding. Unknown keys are a no-op.
    async fn update_enrichment(
        &self,
        full_name: &str,
        summary: &str,
        categories: &[String],
    ) -> Result<()>;

    /// Store the embedding vector for one item.
    async fn update_embedding(&self, full_name: &str, vector: &[f32]) -> Result<()>;

    /// Rank embedded items by cosine similarity to `query_vec`.
    ///
    /// `options` is validated first; an invalid request fails with a
    /// [`SearchError`](crate::search::SearchError) before any data is read.
    async fn search(&self, query_vec: &[f32], options: &SearchOptions) -> Result<Vec<SearchRow>>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Number of items carrying each category label.
    async fn category_breakdown(&self) -> Result<HashMap<String, u64>>;
}
