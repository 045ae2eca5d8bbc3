//! Bounded-concurrency AI enrichment.
//!
//! Spawns one task per item on a [`JoinSet`]; a [`Semaphore`] keeps at most
//! `concurrency` summarization calls in flight. A failed summarization or a
//! failed write is logged and counted, never fatal. Only cancellation fails
//! the run, and it aborts both in-flight and queued tasks.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use star_sync_core::models::Item;
use star_sync_core::store::Store;
use star_sync_core::summarize::Summarizer;

use crate::progress::{CompletionCounter, SyncProgressEvent, SyncProgressReporter};

/// Default number of concurrent summarization calls.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Report progress every this many completions.
const REPORT_EVERY: u64 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichReport {
    pub targets: u64,
    pub enriched: u64,
    pub failed: u64,
}

pub struct EnrichmentScheduler {
    summarizer: Arc<dyn Summarizer>,
    store: Arc<dyn Store>,
    concurrency: usize,
    progress: Arc<dyn SyncProgressReporter>,
}

impl EnrichmentScheduler {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn Store>,
        concurrency: usize,
        progress: Arc<dyn SyncProgressReporter>,
    ) -> Self {
        Self {
            summarizer,
            store,
            concurrency: concurrency.max(1),
            progress,
        }
    }

    /// Summarize every target and write the results back to the store.
    ///
    /// Returns an error only if `cancel` fires before all tasks finish;
    /// enrichments already written stay in the store.
    pub async fn run(&self, targets: Vec<Item>, cancel: &CancellationToken) -> Result<EnrichReport> {
        let total = targets.len() as u64;
        let mut report = EnrichReport {
            targets: total,
            ..Default::default()
        };
        if targets.is_empty() {
            return Ok(report);
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let stored = CompletionCounter::new();
        let finished = CompletionCounter::new();
        let mut join_set: JoinSet<bool> = JoinSet::new();

        for item in targets {
            let semaphore = Arc::clone(&semaphore);
            let summarizer = Arc::clone(&self.summarizer);
            let store = Arc::clone(&self.store);
            let progress = Arc::clone(&self.progress);
            let stored = stored.clone();
            let finished = finished.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!(full_name = %item.full_name, "semaphore closed unexpectedly");
                        return false;
                    }
                };

                let ok = enrich_one(summarizer.as_ref(), store.as_ref(), &item).await;

                // n counts stored enrichments; the last task to finish reports the final count.
                let n = if ok { stored.increment() } else { stored.get() };
                if finished.increment() == total {
                    progress.report(SyncProgressEvent::Enriching {
                        n: stored.get(),
                        total,
                    });
                } else if ok && n < total && n % REPORT_EVERY == 0 {
                    progress.report(SyncProgressEvent::Enriching { n, total });
                }
                ok
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    join_set.abort_all();
                    while join_set.join_next().await.is_some() {}
                    bail!(
                        "enrichment cancelled after {} of {} items",
                        finished.get(),
                        total
                    );
                }
                next = join_set.join_next() => match next {
                    None => break,
                    Some(Ok(true)) => report.enriched += 1,
                    Some(Ok(false)) => report.failed += 1,
                    Some(Err(join_error)) => {
                        warn!(error = %join_error, "enrichment task join error");
                        report.failed += 1;
                    }
                },
            }
        }

        info!(
            enriched = report.enriched,
            failed = report.failed,
            "enrichment complete"
        );
        Ok(report)
    }
}

async fn enrich_one(summarizer: &dyn Summarizer, store: &dyn Store, item: &Item) -> bool {
    let enrichment = match summarizer.summarize(item).await {
        Ok(e) => e,
        Err(e) => {
            warn!(full_name = %item.full_name, error = %format!("{:#}", e), "summarization failed");
            return false;
        }
    };

    if let Err(e) = store
        .update_enrichment(&item.full_name, &enrichment.summary, &enrichment.categories)
        .await
    {
        warn!(full_name = %item.full_name, error = %format!("{:#}", e), "storing enrichment failed");
        return false;
    }

    debug!(full_name = %item.full_name, categories = ?enrichment.categories, "enriched");
    true
}
