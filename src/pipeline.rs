//! Sync pipeline orchestration.
//!
//! Coordinates one synchronization run, strictly in order:
//!
//! 1. ensure the store schema,
//! 2. resolve the item list (cache + incremental fetch, or a full fetch),
//! 3. upsert every item,
//! 4. enrich unenriched items,
//! 5. embed enriched items that have no vector,
//! 6. report.
//!
//! With `skip_enrichment` the run ends after step 3 and makes no AI calls.
//!
//! Nothing is retried automatically; re-running is safe because every store
//! write is idempotent.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use star_sync_core::embedding::Embedder;
use star_sync_core::models::Item;
use star_sync_core::source::{FetchStrategy, FullStrategy, IncrementalStrategy, StarSource};
use star_sync_core::store::Store;
use star_sync_core::summarize::Summarizer;

use crate::cache::SnapshotCache;
use crate::config::Config;
use crate::db;
use crate::embed::{EmbedReport, EmbeddingBatcher, DEFAULT_BATCH_SIZE};
use crate::embedding::{DisabledEmbedder, OpenAiEmbedder};
use crate::enrich::{EnrichReport, EnrichmentScheduler, DEFAULT_CONCURRENCY};
use crate::github::GitHubStarSource;
use crate::llm::{DisabledSummarizer, OpenAiSummarizer};
use crate::progress::{
    should_report, NoProgress, ProgressMode, SyncProgressEvent, SyncProgressReporter,
};
use crate::sqlite_store::SqliteStore;

/// Report upsert progress every this many items.
const UPSERT_REPORT_EVERY: u64 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Stop after upserting; no summarizer or embedder calls.
    pub skip_enrichment: bool,
    /// Re-summarize every item and re-embed every enriched item.
    pub force_reenrich: bool,
    /// Ignore the cache and fetch the whole list.
    pub force_refetch: bool,
}

/// Outcome of one [`Pipeline::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Items in the resolved list.
    pub resolved: u64,
    pub upserted: u64,
    /// Resolved items that were not in the previous cache snapshot.
    pub new_items: u64,
    /// `None` when enrichment was skipped.
    pub enrichment: Option<EnrichReport>,
    /// `None` when enrichment was skipped or nothing needed embedding.
    pub embedding: Option<EmbedReport>,
}

pub struct Pipeline {
    source: Arc<dyn StarSource>,
    store: Arc<dyn Store>,
    summarizer: Arc<dyn Summarizer>,
    embedder: Arc<dyn Embedder>,
    cache: SnapshotCache,
    concurrency: usize,
    batch_size: usize,
    progress: Arc<dyn SyncProgressReporter>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn StarSource>,
        store: Arc<dyn Store>,
        summarizer: Arc<dyn Summarizer>,
        embedder: Arc<dyn Embedder>,
        cache: SnapshotCache,
    ) -> Self {
        Self {
            source,
            store,
            summarizer,
            embedder,
            cache,
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn SyncProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Run one synchronization.
    ///
    /// Fails on a schema, fetch (without cache), upsert, or embedding-batch
    /// error, or when `cancel` fires. Per-item enrichment and embedding-write
    /// failures are counted in the report instead.
    pub async fn run(&self, options: &SyncOptions, cancel: &CancellationToken) -> Result<SyncReport> {
        // Step 1: schema
        until_cancelled(cancel, "schema setup", async {
            self.store
                .init_schema()
                .await
                .context("Failed to initialize store schema")
        })
        .await?;

        // Step 2: resolve items
        let (items, new_items) = until_cancelled(
            cancel,
            "fetch",
            self.resolve_items(options.force_refetch),
        )
        .await?;
        let mut report = SyncReport {
            resolved: items.len() as u64,
            new_items,
            ..Default::default()
        };
        check_cancelled(cancel)?;

        // Step 3: upsert
        report.upserted = self.upsert_all(&items, cancel).await?;

        if options.skip_enrichment {
            info!("skipping enrichment and embedding");
            return Ok(finish(report));
        }

        // Step 4: enrich
        let targets = if options.force_reenrich {
            self.store.get_all().await?
        } else {
            self.store.get_unenriched().await?
        };
        if targets.is_empty() {
            info!("all items already enriched");
        } else {
            info!(targets = targets.len(), "enriching items with AI summaries");
        }
        let scheduler = EnrichmentScheduler::new(
            Arc::clone(&self.summarizer),
            Arc::clone(&self.store),
            self.concurrency,
            Arc::clone(&self.progress),
        );
        report.enrichment = Some(scheduler.run(targets, cancel).await?);
        check_cancelled(cancel)?;

        // Step 5: embed
        let targets: Vec<Item> = if options.force_reenrich {
            self.store
                .get_all()
                .await?
                .into_iter()
                .filter(Item::is_enriched)
                .collect()
        } else {
            self.store.get_needing_embedding().await?
        };
        if targets.is_empty() {
            info!("all enriched items already have embeddings");
        } else {
            info!(targets = targets.len(), "generating embeddings");
            let batcher = EmbeddingBatcher::new(
                Arc::clone(&self.embedder),
                Arc::clone(&self.store),
                self.batch_size,
                Arc::clone(&self.progress),
            );
            report.embedding = Some(
                batcher
                    .run(targets, cancel)
                    .await
                    .context("generating embeddings")?,
            );
        }

        // Step 6: report
        Ok(finish(report))
    }

    /// Resolve the item list and count items not in the previous snapshot.
    async fn resolve_items(&self, force_refetch: bool) -> Result<(Vec<Item>, u64)> {
        let cached = match self.cache.read() {
            Ok(items) => items,
            Err(e) => {
                debug!(error = %format!("{:#}", e), "no usable cache");
                Vec::new()
            }
        };

        if force_refetch || cached.is_empty() {
            let known: HashSet<String> = cached.into_iter().map(|i| i.full_name).collect();
            let items = self.fetch_full_and_cache().await?;
            let new_items = items
                .iter()
                .filter(|i| !known.contains(&i.full_name))
                .count() as u64;
            return Ok((items, new_items));
        }

        info!(cached = cached.len(), "checking for new stars");
        let strategy = IncrementalStrategy;
        self.progress.report(SyncProgressEvent::Fetching {
            strategy: strategy.name().to_string(),
        });

        let known = cached.len();
        match strategy.fetch(self.source.as_ref(), cached.clone()).await {
            Ok(items) => {
                let new_items = items.len().saturating_sub(known) as u64;
                if new_items > 0 {
                    info!(new_items, total = items.len(), "found new stars");
                    self.write_cache(&items);
                } else {
                    info!(total = known, "cache is up to date");
                }
                Ok((items, new_items))
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "incremental fetch failed, using cache as-is");
                Ok((cached, 0))
            }
        }
    }

    async fn fetch_full_and_cache(&self) -> Result<Vec<Item>> {
        let strategy = FullStrategy;
        info!("fetching star list (full)");
        self.progress.report(SyncProgressEvent::Fetching {
            strategy: strategy.name().to_string(),
        });

        let items = strategy
            .fetch(self.source.as_ref(), Vec::new())
            .await
            .context("fetching star list")?;
        info!(fetched = items.len(), "fetched star list");

        self.write_cache(&items);
        Ok(items)
    }

    fn write_cache(&self, items: &[Item]) {
        match self.cache.write(items) {
            Ok(()) => debug!(path = %self.cache.path().display(), "cache written"),
            Err(e) => warn!(
                path = %self.cache.path().display(),
                error = %format!("{:#}", e),
                "could not write cache"
            ),
        }
    }

    async fn upsert_all(&self, items: &[Item], cancel: &CancellationToken) -> Result<u64> {
        let total = items.len() as u64;
        let mut upserted = 0u64;
        for item in items {
            until_cancelled(cancel, "upsert", self.store.upsert_item(item)).await?;
            upserted += 1;
            if should_report(upserted, total, UPSERT_REPORT_EVERY) {
                self.progress
                    .report(SyncProgressEvent::Upserting { n: upserted, total });
            }
        }
        Ok(upserted)
    }
}

fn finish(report: SyncReport) -> SyncReport {
    info!(
        resolved = report.resolved,
        upserted = report.upserted,
        new_items = report.new_items,
        "sync complete"
    );
    report
}

/// Race `fut` against `cancel`; cancellation wins ties.
async fn until_cancelled<T, F>(cancel: &CancellationToken, stage: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => bail!("sync cancelled during {}", stage),
        r = fut => r,
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        bail!("sync cancelled");
    }
    Ok(())
}

/// Wire the production adapters from `config` and run one sync.
///
/// Ctrl-C cancels the run; work already stored is kept.
pub async fn run_sync(config: &Config, options: SyncOptions, mode: ProgressMode) -> Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone(), config.embedding.dims));

    let source: Arc<dyn StarSource> = Arc::new(GitHubStarSource::new(&config.source)?);
    // A skip-enrich run needs only GITHUB_TOKEN.
    let (summarizer, embedder): (Arc<dyn Summarizer>, Arc<dyn Embedder>) =
        if options.skip_enrichment {
            (
                Arc::new(DisabledSummarizer),
                Arc::new(DisabledEmbedder::new(config.embedding.dims)),
            )
        } else {
            (
                Arc::new(OpenAiSummarizer::new(&config.summarizer)?),
                Arc::new(OpenAiEmbedder::new(&config.embedding)?),
            )
        };

    let pipeline = Pipeline::new(
        source,
        store,
        summarizer,
        embedder,
        SnapshotCache::new(&config.cache.path),
    )
    .with_concurrency(config.summarizer.concurrency)
    .with_batch_size(config.embedding.batch_size)
    .with_progress(mode.reporter());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling sync");
            on_signal.cancel();
        }
    });

    let result = pipeline.run(&options, &cancel).await;
    pool.close().await;
    let report = result?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!("sync");
    println!("  resolved: {} items ({} new)", report.resolved, report.new_items);
    println!("  upserted: {}", report.upserted);
    match &report.enrichment {
        Some(e) => println!(
            "  enriched: {} / {} ({} failed)",
            e.enriched, e.targets, e.failed
        ),
        None => println!("  enriched: skipped"),
    }
    match &report.embedding {
        Some(e) => println!(
            "  embedded: {} / {} ({} failed)",
            e.stored, e.targets, e.failed
        ),
        None if report.enrichment.is_none() => println!("  embedded: skipped"),
        None => println!("  embedded: nothing pending"),
    }
    println!("ok");
}
