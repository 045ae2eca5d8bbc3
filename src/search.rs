//! `stars search`: embed a query and print the most similar items.

use anyhow::{bail, Result};

use star_sync_core::search::{FieldValue, SearchOptions, SearchRow};
use star_sync_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding::{embed_query, OpenAiEmbedder};
use crate::sqlite_store::SqliteStore;

/// Overrides for the `[search]` config defaults.
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub limit: Option<usize>,
    pub fields: Option<String>,
    pub sort: Option<String>,
    pub json: bool,
}

pub async fn run_search(config: &Config, query: &str, args: &SearchArgs) -> Result<()> {
    if query.trim().is_empty() {
        bail!("search query must not be empty");
    }

    // Validate before any network or database work.
    let options = SearchOptions::parse(
        args.limit.unwrap_or(config.search.limit),
        args.fields.as_deref().unwrap_or(&config.search.fields),
        args.sort.as_deref().unwrap_or(&config.search.sort),
    )?;

    let embedder = OpenAiEmbedder::new(&config.embedding)?;
    let query_vec = embed_query(&embedder, query).await?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone(), config.embedding.dims);
    let rows = store.search(&query_vec, &options).await;
    pool.close().await;
    let rows = rows?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", format_rows(&rows));
    }
    Ok(())
}

/// Human-readable rendering: one block per row, `score` first.
pub fn format_rows(rows: &[SearchRow]) -> String {
    if rows.is_empty() {
        return "No results found.\n".to_string();
    }

    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        out.push_str(&format!("{}. [{:.3}]\n", i + 1, row.score()));
        for (field, value) in row.iter() {
            if field == "score" {
                continue;
            }
            out.push_str(&format!("    {}: {}\n", field, format_value(value)));
        }
        out.push('\n');
    }
    out
}

fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(s) => s.clone(),
        FieldValue::Integer(i) => i.to_string(),
        FieldValue::Float(f) => format!("{:.3}", f),
        FieldValue::List(l) => l.join(", "),
        FieldValue::Absent => "-".to_string(),
    }
}
