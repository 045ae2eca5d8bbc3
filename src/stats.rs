//! Store statistics and category overview.
//!
//! Used by `stars stats` to show how much of the star list is enriched and
//! embedded, and which categories dominate.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;

use star_sync_core::models::StoreStats;
use star_sync_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub totals: StoreStats,
    pub categories: Vec<CategoryCount>,
}

/// Order categories by count descending, then label ascending.
pub fn sorted_categories(counts: HashMap<String, u64>) -> Vec<CategoryCount> {
    let mut out: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(category, count)| CategoryCount { category, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    out
}

pub async fn collect_stats(store: &dyn Store) -> Result<StatsReport> {
    Ok(StatsReport {
        totals: store.stats().await?,
        categories: sorted_categories(store.category_breakdown().await?),
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone(), config.embedding.dims);
    let report = collect_stats(&store).await;
    pool.close().await;
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let t = &report.totals;
    println!("Star Sync — Store Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Items:       {}", t.total);
    println!("  Enriched:    {} / {} ({}%)", t.enriched, t.total, percent(t.enriched, t.total));
    println!("  Embedded:    {} / {} ({}%)", t.embedded, t.total, percent(t.embedded, t.total));

    if !report.categories.is_empty() {
        println!();
        println!("  Categories:");
        let width = report
            .categories
            .iter()
            .map(|c| c.category.chars().count())
            .max()
            .unwrap_or(0);
        for c in &report.categories {
            println!("    {:<width$}  {}", c.category, c.count, width = width);
        }
    }
    Ok(())
}

fn percent(part: u64, total: u64) -> u64 {
    if total > 0 {
        part * 100 / total
    } else {
        0
    }
}
