use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::Config;
use crate::db;

/// Create the schema on a fresh pool and close it. Used by `stars init`.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool, config.embedding.dims).await?;
    pool.close().await;
    Ok(())
}

/// Create tables if missing and record the embedding dimensionality.
///
/// When `dims` differs from the recorded value every stored embedding is
/// cleared so that the next sync re-embeds with the new model.
pub async fn migrate(pool: &SqlitePool, dims: usize) -> Result<()> {
    // Create items table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            full_name TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            url TEXT NOT NULL,
            homepage_url TEXT,
            stars INTEGER NOT NULL DEFAULT 0,
            language TEXT,
            topics TEXT NOT NULL DEFAULT '[]',
            readme_excerpt TEXT,
            ai_summary TEXT,
            ai_categories TEXT,
            embedding BLOB,
            fetched_at INTEGER,
            enriched_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create items table")?;

    // Create store_meta table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_stars ON items(stars DESC)")
        .execute(pool)
        .await?;

    let recorded: Option<String> =
        sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'embedding_dims'")
            .fetch_optional(pool)
            .await?;

    if let Some(prev) = recorded {
        if prev != dims.to_string() {
            let cleared = sqlx::query("UPDATE items SET embedding = NULL WHERE embedding IS NOT NULL")
                .execute(pool)
                .await?
                .rows_affected();
            warn!(
                previous = %prev,
                dims,
                cleared,
                "embedding dimensionality changed, cleared stored embeddings"
            );
        }
    }

    for (key, value) in [("embedding_dims", dims.to_string()), ("distance", "cosine".to_string())] {
        sqlx::query(
            r#"
            INSERT INTO store_meta (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(&value)
        .execute(pool)
        .await?;
    }

    info!(dims, "schema ready");
    Ok(())
}
