//! SQLite-backed [`Store`] implementation.
//!
//! One `items` row per starred repository, keyed by `full_name`. Lists are
//! stored as JSON text, embeddings as little-endian f32 BLOBs, and
//! timestamps as unix seconds. Similarity search is a brute-force cosine
//! scan over every embedded row.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use star_sync_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use star_sync_core::models::{Item, StoreStats};
use star_sync_core::search::{
    count_categories, field_kind, rank_rows, FieldKind, FieldValue, SearchOptions, SearchRow,
    SCORE_FIELD,
};
use star_sync_core::store::Store;

use crate::migrate;

const ITEM_COLUMNS: &str = "full_name, owner, name, description, url, homepage_url, stars, \
     language, topics, readme_excerpt, ai_summary, ai_categories, embedding, fetched_at, enriched_at";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteStore {
    /// `dims` is the embedding dimensionality this store accepts.
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self { pool, dims }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn select_items(&self, filter: &str) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {} FROM items {} ORDER BY rowid",
            ITEM_COLUMNS, filter
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_item).collect()
    }
}

fn to_ts(t: Option<DateTime<Utc>>) -> Option<i64> {
    t.map(|t| t.timestamp())
}

fn from_ts(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(|s| DateTime::from_timestamp(s, 0))
}

fn parse_list(raw: Option<String>, column: &str) -> Result<Option<Vec<String>>> {
    raw.map(|s| {
        serde_json::from_str(&s).with_context(|| format!("corrupt JSON list in column {}", column))
    })
    .transpose()
}

fn row_to_item(row: &SqliteRow) -> Result<Item> {
    let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
    Ok(Item {
        full_name: row.try_get("full_name")?,
        owner: row.try_get("owner")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        url: row.try_get("url")?,
        homepage_url: row.try_get("homepage_url")?,
        stars: row.try_get("stars")?,
        language: row.try_get("language")?,
        topics: parse_list(row.try_get("topics")?, "topics")?.unwrap_or_default(),
        readme_excerpt: row.try_get("readme_excerpt")?,
        ai_summary: row.try_get("ai_summary")?,
        ai_categories: parse_list(row.try_get("ai_categories")?, "ai_categories")?,
        embedding: embedding.map(|b| blob_to_vec(&b)),
        fetched_at: from_ts(row.try_get("fetched_at")?),
        enriched_at: from_ts(row.try_get("enriched_at")?),
    })
}

/// Decode one allow-listed column of a search row.
fn column_value(row: &SqliteRow, column: &str) -> Result<FieldValue> {
    let value = match field_kind(column) {
        Some(FieldKind::Text) => row
            .try_get::<Option<String>, _>(column)?
            .map(FieldValue::Text),
        Some(FieldKind::Integer) => row
            .try_get::<Option<i64>, _>(column)?
            .map(FieldValue::Integer),
        Some(FieldKind::List) => parse_list(row.try_get(column)?, column)?.map(FieldValue::List),
        Some(FieldKind::Timestamp) => {
            return Ok(FieldValue::from_timestamp(from_ts(row.try_get(column)?)))
        }
        Some(FieldKind::Score) | None => None,
    };
    Ok(value.unwrap_or(FieldValue::Absent))
}

#[async_trait]
impl Store for SqliteStore {
    async fn init_schema(&self) -> Result<()> {
        migrate::migrate(&self.pool, self.dims).await
    }

    async fn upsert_item(&self, item: &Item) -> Result<()> {
        let topics = serde_json::to_string(&item.topics)?;
        let categories = item
            .ai_categories
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO items (full_name, owner, name, description, url, homepage_url,
                               stars, language, topics, readme_excerpt, ai_summary,
                               ai_categories, fetched_at, enriched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(full_name) DO UPDATE SET
                owner = excluded.owner,
                name = excluded.name,
                description = COALESCE(excluded.description, items.description),
                url = excluded.url,
                homepage_url = COALESCE(excluded.homepage_url, items.homepage_url),
                stars = excluded.stars,
                language = COALESCE(excluded.language, items.language),
                topics = excluded.topics,
                readme_excerpt = COALESCE(excluded.readme_excerpt, items.readme_excerpt),
                ai_summary = COALESCE(excluded.ai_summary, items.ai_summary),
                ai_categories = COALESCE(excluded.ai_categories, items.ai_categories),
                fetched_at = COALESCE(excluded.fetched_at, items.fetched_at),
                enriched_at = COALESCE(excluded.enriched_at, items.enriched_at)
            "#,
        )
        .bind(&item.full_name)
        .bind(&item.owner)
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.url)
        .bind(&item.homepage_url)
        .bind(item.stars)
        .bind(&item.language)
        .bind(&topics)
        .bind(&item.readme_excerpt)
        .bind(&item.ai_summary)
        .bind(&categories)
        .bind(to_ts(item.fetched_at))
        .bind(to_ts(item.enriched_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert {}", item.full_name))?;

        Ok(())
    }

    async fn get_unenriched(&self) -> Result<Vec<Item>> {
        self.select_items("WHERE ai_summary IS NULL").await
    }

    async fn get_needing_embedding(&self) -> Result<Vec<Item>> {
        self.select_items("WHERE ai_summary IS NOT NULL AND embedding IS NULL")
            .await
    }

    async fn get_all(&self) -> Result<Vec<Item>> {
        self.select_items("").await
    }

    async fn update_enrichment(
        &self,
        full_name: &str,
        summary: &str,
        categories: &[String],
    ) -> Result<()> {
        let categories = serde_json::to_string(categories)?;
        sqlx::query(
            "UPDATE items SET ai_summary = ?, ai_categories = ?, enriched_at = ? WHERE full_name = ?",
        )
        .bind(summary)
        .bind(&categories)
        .bind(Utc::now().timestamp())
        .bind(full_name)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store enrichment for {}", full_name))?;
        Ok(())
    }

    async fn update_embedding(&self, full_name: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            bail!(
                "embedding for {} has {} dimensions, store expects {}",
                full_name,
                vector.len(),
                self.dims
            );
        }
        sqlx::query("UPDATE items SET embedding = ? WHERE full_name = ?")
            .bind(vec_to_blob(vector))
            .bind(full_name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to store embedding for {}", full_name))?;
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], options: &SearchOptions) -> Result<Vec<SearchRow>> {
        options.validate()?;
        let columns = options.columns();

        // Column names are interpolated only after allow-list validation.
        let mut select: Vec<&str> = columns.clone();
        select.push("embedding");
        let sql = format!(
            "SELECT {} FROM items WHERE embedding IS NOT NULL",
            select.join(", ")
        );

        let db_rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut rows = Vec::with_capacity(db_rows.len());
        for db_row in &db_rows {
            let blob: Vec<u8> = db_row.try_get("embedding")?;
            let score = cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64;

            let mut row = SearchRow::new();
            for col in &columns {
                row.insert(*col, column_value(db_row, col)?);
            }
            row.insert(SCORE_FIELD, FieldValue::Float(score));
            rows.push(row);
        }

        Ok(rank_rows(rows, options))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let (total, enriched, embedded): (i64, i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COUNT(ai_summary), COUNT(embedding) FROM items")
                .fetch_one(&self.pool)
                .await?;
        Ok(StoreStats {
            total: total as u64,
            enriched: enriched as u64,
            embedded: embedded as u64,
        })
    }

    async fn category_breakdown(&self) -> Result<HashMap<String, u64>> {
        let raw: Vec<String> =
            sqlx::query_scalar("SELECT ai_categories FROM items WHERE ai_categories IS NOT NULL")
                .fetch_all(&self.pool)
                .await?;
        let lists = raw
            .into_iter()
            .map(|s| parse_list(Some(s), "ai_categories").map(Option::unwrap_or_default))
            .collect::<Result<Vec<Vec<String>>>>()?;
        Ok(count_categories(lists.iter().map(Vec::as_slice)))
    }
}
