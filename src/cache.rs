//! File-backed snapshot of the last fetched star list.
//!
//! The snapshot is a pretty-printed JSON array of items. It is replaced
//! wholesale: written to a sibling temp file, then renamed over the old one.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use star_sync_core::models::Item;

#[derive(Debug, Clone)]
pub struct SnapshotCache {
    path: PathBuf,
}

impl SnapshotCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing or corrupt file is an error; callers
    /// treat it as "no cache".
    pub fn read(&self) -> Result<Vec<Item>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cache: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse cache: {}", self.path.display()))
    }

    /// Replace the snapshot with `items`.
    pub fn write(&self, items: &[Item]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(items)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write cache: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace cache: {}", self.path.display()))?;
        Ok(())
    }
}
