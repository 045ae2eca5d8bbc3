//! Chunked embedding of enriched items.
//!
//! Inputs are split into batches of at most `batch_size` texts, sent one
//! batch at a time. Each returned vector is placed by `batch_start + index`,
//! so providers may answer out of order. A failed batch fails the whole run;
//! a failed per-item write is logged and skipped.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use star_sync_core::embedding::Embedder;
use star_sync_core::models::Item;
use star_sync_core::store::Store;

use crate::progress::{SyncProgressEvent, SyncProgressReporter};

/// Default maximum texts per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbedReport {
    pub targets: u64,
    pub stored: u64,
    pub failed: u64,
}

/// Embed `texts` in batches and return one vector per input, in input order.
pub async fn embed_all(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
    cancel: &CancellationToken,
    progress: &dyn SyncProgressReporter,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let total = texts.len() as u64;
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

    for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
        let start = batch_no * batch_size;
        let end = start + batch.len();

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => bail!("embedding cancelled at batch {}-{}", start, end),
            r = embedder.embed(batch) => {
                r.with_context(|| format!("creating embeddings (batch {}-{})", start, end))?
            }
        };

        for v in results {
            if v.index >= batch.len() {
                bail!(
                    "embedding provider returned index {} for a batch of {} (batch {}-{})",
                    v.index,
                    batch.len(),
                    start,
                    end
                );
            }
            slots[start + v.index] = Some(v.vector);
        }

        debug!(start, end, "embedded batch");
        progress.report(SyncProgressEvent::Embedding {
            n: end as u64,
            total,
        });
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| anyhow!("embedding provider returned no vector for input {}", i)))
        .collect()
}

pub struct EmbeddingBatcher {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn Store>,
    batch_size: usize,
    progress: Arc<dyn SyncProgressReporter>,
}

impl EmbeddingBatcher {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn Store>,
        batch_size: usize,
        progress: Arc<dyn SyncProgressReporter>,
    ) -> Self {
        Self {
            embedder,
            store,
            batch_size,
            progress,
        }
    }

    /// Embed every target's `"{full_name}: {summary}"` text and store the
    /// vectors.
    pub async fn run(&self, targets: Vec<Item>, cancel: &CancellationToken) -> Result<EmbedReport> {
        let mut report = EmbedReport {
            targets: targets.len() as u64,
            ..Default::default()
        };
        if targets.is_empty() {
            return Ok(report);
        }

        let texts: Vec<String> = targets.iter().map(Item::embedding_input).collect();
        let vectors = embed_all(
            self.embedder.as_ref(),
            &texts,
            self.batch_size,
            cancel,
            self.progress.as_ref(),
        )
        .await?;

        for (item, vector) in targets.iter().zip(vectors) {
            if cancel.is_cancelled() {
                bail!(
                    "embedding cancelled after storing {} of {} vectors",
                    report.stored,
                    report.targets
                );
            }
            match self.store.update_embedding(&item.full_name, &vector).await {
                Ok(()) => report.stored += 1,
                Err(e) => {
                    warn!(full_name = %item.full_name, error = %format!("{:#}", e), "storing embedding failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            model = self.embedder.model_name(),
            stored = report.stored,
            failed = report.failed,
            "embeddings stored"
        );
        Ok(report)
    }
}
