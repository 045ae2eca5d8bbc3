//! End-to-end tests for the sync pipeline.
//!
//! Every external capability is replaced by an in-process fake: a paged
//! star list, a summarizer that can be told to fail for specific items, and
//! an embedder that returns vectors out of order. The store is the
//! in-memory backend and the cache lives in a temp directory.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use star_sync::cache::SnapshotCache;
use star_sync::pipeline::{Pipeline, SyncOptions};
use star_sync::progress::{SyncProgressEvent, SyncProgressReporter};
use star_sync_core::embedding::{Embedder, IndexedVector};
use star_sync_core::models::{Enrichment, Item, Page, PageInfo};
use star_sync_core::source::{Direction, StarSource};
use star_sync_core::store::memory::InMemoryStore;
use star_sync_core::store::Store;
use star_sync_core::summarize::Summarizer;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ─── Fakes ──────────────────────────────────────────────────────────

fn item(i: usize) -> Item {
    let mut item = Item::new(
        "owner",
        format!("repo{}", i),
        format!("https://github.com/owner/repo{}", i),
    );
    item.stars = i as i64;
    item.description = Some(format!("Repository number {}", i));
    item
}

/// A star list served in fixed-size pages. Cursors are item offsets.
struct PagedSource {
    items: Mutex<Vec<Item>>,
    page_size: usize,
    failing: AtomicBool,
    forward_calls: AtomicUsize,
    backward_calls: AtomicUsize,
}

impl PagedSource {
    fn new(n: usize, page_size: usize) -> Self {
        Self {
            items: Mutex::new((0..n).map(item).collect()),
            page_size,
            failing: AtomicBool::new(false),
            forward_calls: AtomicUsize::new(0),
            backward_calls: AtomicUsize::new(0),
        }
    }

    fn star(&self, i: usize) {
        self.items.lock().unwrap().push(item(i));
    }

    fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StarSource for PagedSource {
    async fn fetch_page(&self, cursor: Option<&str>, direction: Direction) -> Result<Page> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("GitHub API returned 502 Bad Gateway");
        }
        let items = self.items.lock().unwrap().clone();
        let len = items.len();
        let (start, end) = match direction {
            Direction::Forward => {
                self.forward_calls.fetch_add(1, Ordering::SeqCst);
                let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
                (start, (start + self.page_size).min(len))
            }
            Direction::Backward => {
                self.backward_calls.fetch_add(1, Ordering::SeqCst);
                let end: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(len);
                (end.saturating_sub(self.page_size), end)
            }
        };
        Ok(Page {
            items: items[start..end].to_vec(),
            total_count: len as u64,
            page_info: PageInfo {
                has_next_page: end < len,
                end_cursor: Some(end.to_string()),
                has_previous_page: start > 0,
                start_cursor: Some(start.to_string()),
            },
        })
    }
}

/// Summarizes every item except those named in `failures`.
struct FakeSummarizer {
    failures: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeSummarizer {
    fn new() -> Self {
        Self::failing_for(&[])
    }

    fn failing_for(names: &[&str]) -> Self {
        Self {
            failures: names.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, item: &Item) -> Result<Enrichment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.contains(&item.full_name) {
            bail!("unparseable summary payload: not json");
        }
        let category = if item.stars % 2 == 0 { "AI Agents" } else { "Data Engineering" };
        Ok(Enrichment {
            summary: format!("A tool called {}.", item.name),
            categories: vec![category.to_string()],
        })
    }
}

/// Deterministic vector for a text, so alignment can be checked afterwards.
fn vector_for(text: &str) -> Vec<f32> {
    let sum: u32 = text.bytes().map(u32::from).sum();
    vec![text.len() as f32, sum as f32, 1.0]
}

/// Returns each batch in reverse order and records batch sizes.
struct ReversingEmbedder {
    batches: Mutex<Vec<usize>>,
}

impl ReversingEmbedder {
    fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
        }
    }

    fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for ReversingEmbedder {
    fn model_name(&self) -> &str {
        "reversing"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<IndexedVector>> {
        self.batches.lock().unwrap().push(texts.len());
        Ok(texts
            .iter()
            .enumerate()
            .rev()
            .map(|(index, text)| IndexedVector {
                index,
                vector: vector_for(text),
            })
            .collect())
    }
}

/// Collects every progress event.
#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<SyncProgressEvent>>,
}

impl SyncProgressReporter for RecordingProgress {
    fn report(&self, event: SyncProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ─── Harness ────────────────────────────────────────────────────────

struct Harness {
    _dir: TempDir,
    cache_path: std::path::PathBuf,
    source: Arc<PagedSource>,
    store: Arc<InMemoryStore>,
    summarizer: Arc<FakeSummarizer>,
    embedder: Arc<ReversingEmbedder>,
}

impl Harness {
    fn new(n: usize, page_size: usize) -> Self {
        Self::with_summarizer(n, page_size, FakeSummarizer::new())
    }

    fn with_summarizer(n: usize, page_size: usize, summarizer: FakeSummarizer) -> Self {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("cache").join("stars.json");
        Self {
            _dir: dir,
            cache_path,
            source: Arc::new(PagedSource::new(n, page_size)),
            store: Arc::new(InMemoryStore::with_dims(3)),
            summarizer: Arc::new(summarizer),
            embedder: Arc::new(ReversingEmbedder::new()),
        }
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.source.clone(),
            self.store.clone(),
            self.summarizer.clone(),
            self.embedder.clone(),
            SnapshotCache::new(&self.cache_path),
        )
        .with_concurrency(3)
    }

    fn cache(&self) -> SnapshotCache {
        SnapshotCache::new(&self.cache_path)
    }

    async fn assert_embeddings_aligned(&self) {
        for item in self.store.get_all().await.unwrap() {
            if let Some(vector) = &item.embedding {
                assert_eq!(
                    vector,
                    &vector_for(&item.embedding_input()),
                    "misaligned vector for {}",
                    item.full_name
                );
            }
        }
    }
}

fn run_options() -> SyncOptions {
    SyncOptions::default()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_sync_fetches_enriches_and_embeds() {
    let h = Harness::new(5, 2);
    let report = h
        .pipeline()
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.resolved, 5);
    assert_eq!(report.upserted, 5);
    assert_eq!(report.new_items, 5);
    let enrichment = report.enrichment.unwrap();
    assert_eq!((enrichment.targets, enrichment.enriched, enrichment.failed), (5, 5, 0));
    let embedding = report.embedding.unwrap();
    assert_eq!((embedding.targets, embedding.stored, embedding.failed), (5, 5, 0));

    // Full strategy pages forward: 2 + 2 + 1.
    assert_eq!(h.source.forward_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.source.backward_calls.load(Ordering::SeqCst), 0);

    let cached = h.cache().read().unwrap();
    assert_eq!(cached.len(), 5);
    assert_eq!(cached[0].full_name, "owner/repo0");

    let stats = h.store.stats().await.unwrap();
    assert_eq!((stats.total, stats.enriched, stats.embedded), (5, 5, 5));
    h.assert_embeddings_aligned().await;
}

#[tokio::test]
async fn test_second_sync_is_incremental() {
    let h = Harness::new(5, 2);
    h.pipeline()
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap();

    h.source.star(5);
    h.source.star(6);

    let report = h
        .pipeline()
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.resolved, 7);
    assert_eq!(report.new_items, 2);
    assert_eq!(report.enrichment.unwrap().targets, 2);
    assert_eq!(report.embedding.unwrap().targets, 2);
    // Only the first run paged forward.
    assert_eq!(h.source.forward_calls.load(Ordering::SeqCst), 3);
    assert!(h.source.backward_calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(h.summarizer.calls(), 7);

    let names: Vec<String> = h
        .cache()
        .read()
        .unwrap()
        .into_iter()
        .map(|i| i.full_name)
        .collect();
    assert_eq!(names.len(), 7);
    assert_eq!(names[5], "owner/repo5");
    assert_eq!(names[6], "owner/repo6");
}

#[tokio::test]
async fn test_resync_with_no_changes_does_no_work() {
    let h = Harness::new(4, 10);
    let pipeline = h.pipeline();
    pipeline
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap();
    let report = pipeline
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.resolved, 4);
    assert_eq!(report.new_items, 0);
    assert_eq!(report.enrichment.unwrap().targets, 0);
    assert!(report.embedding.is_none());
    assert_eq!(h.summarizer.calls(), 4);
    assert_eq!(h.embedder.batches(), vec![4]);

    // Re-upserting cached source data keeps the enrichment.
    let item = h.store.get("owner/repo1").unwrap();
    assert_eq!(item.ai_summary.as_deref(), Some("A tool called repo1."));
    assert!(item.embedding.is_some());
}

#[tokio::test]
async fn test_fetch_failure_falls_back_to_cache() {
    let h = Harness::new(3, 2);
    h.pipeline()
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap();

    h.source.fail();
    let report = h
        .pipeline()
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.resolved, 3);
    assert_eq!(report.new_items, 0);
    assert_eq!(report.upserted, 3);
}

#[tokio::test]
async fn test_fetch_failure_without_cache_is_fatal() {
    let h = Harness::new(3, 2);
    h.source.fail();

    let err = h
        .pipeline()
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("502"));
    assert_eq!(h.store.stats().await.unwrap().total, 0);
    assert!(!h.cache_path.exists());
}

#[tokio::test]
async fn test_summarizer_failure_skips_only_that_item() {
    let h = Harness::with_summarizer(5, 2, FakeSummarizer::failing_for(&["owner/repo2"]));
    let report = h
        .pipeline()
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap();

    let enrichment = report.enrichment.unwrap();
    assert_eq!((enrichment.enriched, enrichment.failed), (4, 1));
    assert_eq!(report.embedding.unwrap().stored, 4);

    let unenriched: Vec<String> = h
        .store
        .get_unenriched()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.full_name)
        .collect();
    assert_eq!(unenriched, vec!["owner/repo2"]);
    assert!(h.store.get("owner/repo2").unwrap().embedding.is_none());
}

#[tokio::test]
async fn test_skip_enrichment_only_upserts() {
    let h = Harness::new(5, 2);
    let options = SyncOptions {
        skip_enrichment: true,
        ..Default::default()
    };
    let report = h
        .pipeline()
        .run(&options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.upserted, 5);
    assert!(report.enrichment.is_none());
    assert!(report.embedding.is_none());
    assert_eq!(h.summarizer.calls(), 0);
    assert!(h.embedder.batches().is_empty());

    let stats = h.store.stats().await.unwrap();
    assert_eq!((stats.total, stats.enriched, stats.embedded), (5, 0, 0));
}

#[tokio::test]
async fn test_force_reenriches_and_reembeds_everything() {
    let h = Harness::new(5, 2);
    let pipeline = h.pipeline();
    pipeline
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap();

    let options = SyncOptions {
        force_reenrich: true,
        ..Default::default()
    };
    let report = pipeline
        .run(&options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.enrichment.unwrap().targets, 5);
    assert_eq!(report.embedding.unwrap().targets, 5);
    assert_eq!(h.summarizer.calls(), 10);
    assert_eq!(h.embedder.batches(), vec![5, 5]);
    h.assert_embeddings_aligned().await;
}

#[tokio::test]
async fn test_refresh_ignores_cache() {
    let h = Harness::new(3, 2);
    let pipeline = h.pipeline();
    pipeline
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap();

    let options = SyncOptions {
        force_refetch: true,
        ..Default::default()
    };
    let report = pipeline
        .run(&options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.resolved, 3);
    assert_eq!(report.new_items, 0);
    assert_eq!(h.source.forward_calls.load(Ordering::SeqCst), 4);
    assert_eq!(h.source.backward_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_embedding_batches_of_256_stay_aligned() {
    let h = Harness::new(300, 100);
    let progress = Arc::new(RecordingProgress::default());
    let report = h
        .pipeline()
        .with_batch_size(256)
        .with_progress(progress.clone())
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.embedding.unwrap().stored, 300);
    assert_eq!(h.embedder.batches(), vec![256, 44]);
    h.assert_embeddings_aligned().await;

    let events = progress.events.lock().unwrap();
    let upserts: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            SyncProgressEvent::Upserting { n, .. } => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(upserts, vec![50, 100, 150, 200, 250, 300]);
    assert!(events.contains(&SyncProgressEvent::Fetching {
        strategy: "full".to_string()
    }));
    assert!(events.contains(&SyncProgressEvent::Enriching { n: 300, total: 300 }));
}

#[tokio::test]
async fn test_cancelled_sync_fails_before_upsert() {
    let h = Harness::new(5, 2);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h.pipeline().run(&run_options(), &cancel).await.unwrap_err();

    assert!(err.to_string().contains("cancelled"));
    assert_eq!(h.store.stats().await.unwrap().total, 0);
    assert_eq!(h.summarizer.calls(), 0);
}

#[tokio::test]
async fn test_skip_enrichment_makes_no_embedding_calls() {
    let h = Harness::new(3, 2);
    // Enriched earlier but never embedded.
    h.store.upsert_item(&item(0)).await.unwrap();
    h.store
        .update_enrichment("owner/repo0", "A tool called repo0.", &[])
        .await
        .unwrap();

    let options = SyncOptions {
        skip_enrichment: true,
        ..Default::default()
    };
    let report = h
        .pipeline()
        .run(&options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.upserted, 3);
    assert!(report.embedding.is_none());
    assert!(h.embedder.batches().is_empty());
    assert_eq!(h.store.get_needing_embedding().await.unwrap().len(), 1);
}

/// A source whose pages never arrive.
struct StalledSource;

#[async_trait]
impl StarSource for StalledSource {
    async fn fetch_page(&self, _cursor: Option<&str>, _direction: Direction) -> Result<Page> {
        std::future::pending::<Result<Page>>().await
    }
}

#[tokio::test]
async fn test_cancel_interrupts_a_stalled_fetch() {
    let h = Harness::new(0, 1);
    let pipeline = Pipeline::new(
        Arc::new(StalledSource),
        h.store.clone(),
        h.summarizer.clone(),
        h.embedder.clone(),
        h.cache(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        pipeline.run(&run_options(), &cancel),
    )
    .await
    .expect("cancellation did not interrupt the fetch");

    let err = outcome.unwrap_err();
    assert!(err.to_string().contains("cancelled during fetch"), "{:#}", err);
    assert_eq!(h.store.stats().await.unwrap().total, 0);
    assert!(!h.cache_path.exists());
}

#[tokio::test]
async fn test_unwritable_cache_does_not_fail_sync() {
    let mut h = Harness::new(3, 2);
    let blocker = h._dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    h.cache_path = blocker.join("stars.json");

    let report = h
        .pipeline()
        .run(&run_options(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.resolved, 3);
    assert_eq!(report.upserted, 3);
    assert_eq!(report.embedding.unwrap().stored, 3);
    assert!(!h.cache_path.exists());
}
