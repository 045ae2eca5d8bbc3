//! Sync progress reporting.
//!
//! Reports observable progress during `stars sync` so users see which stage
//! is running and how much is left. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A single progress event for sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncProgressEvent {
    /// Paging through the remote list with the named strategy. Total unknown.
    Fetching { strategy: String },
    /// n items upserted out of total.
    Upserting { n: u64, total: u64 },
    /// n enrichments stored out of total targets.
    Enriching { n: u64, total: u64 },
    /// n embedding inputs sent out of total.
    Embedding { n: u64, total: u64 },
}

impl SyncProgressEvent {
    fn phase(&self) -> &'static str {
        match self {
            SyncProgressEvent::Fetching { .. } => "fetching",
            SyncProgressEvent::Upserting { .. } => "upserting",
            SyncProgressEvent::Enriching { .. } => "enriching",
            SyncProgressEvent::Embedding { .. } => "embedding",
        }
    }
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline and its workers.
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync  enriching  120 / 1,234 items".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Fetching { strategy } => {
                format!("sync  fetching ({})...\n", strategy)
            }
            SyncProgressEvent::Upserting { n, total }
            | SyncProgressEvent::Enriching { n, total }
            | SyncProgressEvent::Embedding { n, total } => format!(
                "sync  {}  {} / {} items\n",
                event.phase(),
                format_number(*n),
                format_number(*total)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Fetching { strategy } => serde_json::json!({
                "event": "progress",
                "phase": event.phase(),
                "strategy": strategy
            }),
            SyncProgressEvent::Upserting { n, total }
            | SyncProgressEvent::Enriching { n, total }
            | SyncProgressEvent::Embedding { n, total } => serde_json::json!({
                "event": "progress",
                "phase": event.phase(),
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

/// Shared count of finished tasks.
///
/// Cloning shares the underlying counter.
#[derive(Clone, Debug, Default)]
pub struct CompletionCounter {
    done: Arc<AtomicU64>,
}

impl CompletionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completion and return the new count.
    pub fn increment(&self) -> u64 {
        self.done.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u64 {
        self.done.load(Ordering::SeqCst)
    }
}

/// Whether the `n`th of `total` completions should be reported.
pub fn should_report(n: u64, total: u64, every: u64) -> bool {
    n == total || (every > 0 && n % every == 0)
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
