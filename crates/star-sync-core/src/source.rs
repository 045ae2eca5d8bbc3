//! Star list source abstraction and the two fetch strategies.
//!
//! A [`StarSource`] returns one [`Page`] at a time in either direction. A
//! [`FetchStrategy`] turns a sequence of page fetches into the complete item
//! list to cache:
//!
//! - **[`FullStrategy`]** pages forward from the start and returns everything.
//! - **[`IncrementalStrategy`]** pages backward from the end, stops at the
//!   first page holding an item the caller already knows, and appends the new
//!   items to the known set.
//!
//! # Ordering assumption
//!
//! The incremental strategy relies on the remote list being ordered
//! oldest-starred first so that new additions appear at the end. GitHub does
//! not document the order of `UserList.items`; run a full refresh periodically
//! to reconcile removals or reorderings.

use std::collections::HashSet;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::models::{Item, Page};

/// Pagination direction over the remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `first`/`after`: from the oldest item towards the newest.
    Forward,
    /// `last`/`before`: from the newest item towards the oldest.
    Backward,
}

/// Paginated read access to the remote star list.
#[async_trait]
pub trait StarSource: Send + Sync {
    /// Fetch one page.
    ///
    /// `cursor` is `None` for the first page in the given direction. For
    /// [`Direction::Forward`] it is the previous page's `end_cursor`; for
    /// [`Direction::Backward`] the previous page's `start_cursor`.
    async fn fetch_page(&self, cursor: Option<&str>, direction: Direction) -> Result<Page>;
}

/// An algorithm for producing the complete item list from a [`StarSource`].
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Return the complete set of items to cache. `known` is the previously
    /// cached set, empty on a first run.
    async fn fetch(&self, source: &dyn StarSource, known: Vec<Item>) -> Result<Vec<Item>>;
}

/// Fetch every item via forward pagination. Makes no ordering assumptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullStrategy;

#[async_trait]
impl FetchStrategy for FullStrategy {
    fn name(&self) -> &str {
        "full"
    }

    async fn fetch(&self, source: &dyn StarSource, _known: Vec<Item>) -> Result<Vec<Item>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = source
                .fetch_page(cursor.as_deref(), Direction::Forward)
                .await?;
            all.extend(page.items);
            debug!(fetched = all.len(), total = page.total_count, "fetched page");

            if !page.page_info.has_next_page {
                break;
            }
            match page.page_info.end_cursor {
                Some(next) => cursor = Some(next),
                None => bail!("source reported a next page without an end cursor"),
            }
        }

        info!(fetched = all.len(), "full fetch complete");
        Ok(all)
    }
}

/// Fetch only items added since the known set was cached.
///
/// Falls back to [`FullStrategy`] when the known set is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncrementalStrategy;

#[async_trait]
impl FetchStrategy for IncrementalStrategy {
    fn name(&self) -> &str {
        "incremental"
    }

    async fn fetch(&self, source: &dyn StarSource, known: Vec<Item>) -> Result<Vec<Item>> {
        if known.is_empty() {
            info!("no known items, falling back to full fetch");
            return FullStrategy.fetch(source, known).await;
        }

        let known_names: HashSet<&str> = known.iter().map(|i| i.full_name.as_str()).collect();

        // Pages of new items, newest page first.
        let mut new_pages: Vec<Vec<Item>> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = source
                .fetch_page(cursor.as_deref(), Direction::Backward)
                .await?;

            // Items within a backward page are still in connection order.
            let mut hit_known = false;
            let mut fresh = Vec::new();
            for item in page.items {
                if known_names.contains(item.full_name.as_str()) {
                    hit_known = true;
                } else {
                    fresh.push(item);
                }
            }
            if !fresh.is_empty() {
                new_pages.push(fresh);
            }

            if hit_known || !page.page_info.has_previous_page {
                break;
            }
            match page.page_info.start_cursor {
                Some(prev) => cursor = Some(prev),
                None => bail!("source reported a previous page without a start cursor"),
            }
        }

        let new_items: Vec<Item> = new_pages.into_iter().rev().flatten().collect();
        if new_items.is_empty() {
            debug!("no new items");
            return Ok(known);
        }

        info!(new = new_items.len(), "incremental fetch found new items");
        let mut all = known;
        all.extend(new_items);
        Ok(all)
    }
}
