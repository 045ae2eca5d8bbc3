//! Integration tests for the SQLite store against a real database file.

use chrono::Utc;
use star_sync::db;
use star_sync::sqlite_store::SqliteStore;
use star_sync_core::models::Item;
use star_sync_core::search::{FieldValue, SearchError, SearchOptions, SortClause, SortDirection};
use star_sync_core::store::Store;
use tempfile::TempDir;

async fn open_store(dir: &TempDir, dims: usize) -> SqliteStore {
    let pool = db::connect_path(&dir.path().join("data").join("stars.sqlite"))
        .await
        .unwrap();
    let store = SqliteStore::new(pool, dims);
    store.init_schema().await.unwrap();
    store
}

fn repo(name: &str, stars: i64) -> Item {
    let mut item = Item::new("acme", name, format!("https://github.com/acme/{}", name));
    item.stars = stars;
    item.description = Some(format!("{} does things", name));
    item.language = Some("Rust".to_string());
    item.topics = vec!["cli".to_string(), "search".to_string()];
    item.readme_excerpt = Some(format!("# {}", name));
    item.fetched_at = Some(Utc::now());
    item
}

#[tokio::test]
async fn test_init_schema_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 3).await;
    store.init_schema().await.unwrap();
    store.init_schema().await.unwrap();
    assert_eq!(store.stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_upsert_roundtrips_every_column() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 3).await;
    let item = repo("tool", 42);
    store.upsert_item(&item).await.unwrap();

    let all = store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    let got = &all[0];
    assert_eq!(got.full_name, "acme/tool");
    assert_eq!(got.owner, "acme");
    assert_eq!(got.stars, 42);
    assert_eq!(got.topics, vec!["cli", "search"]);
    assert_eq!(got.readme_excerpt.as_deref(), Some("# tool"));
    assert_eq!(
        got.fetched_at.map(|t| t.timestamp()),
        item.fetched_at.map(|t| t.timestamp())
    );
    assert!(got.ai_summary.is_none());
    assert!(got.embedding.is_none());
}

#[tokio::test]
async fn test_upsert_twice_leaves_one_row() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 3).await;
    let item = repo("tool", 1);
    store.upsert_item(&item).await.unwrap();
    store.upsert_item(&item).await.unwrap();
    assert_eq!(store.stats().await.unwrap().total, 1);
}

#[tokio::test]
async fn test_upsert_merges_and_preserves_enrichment() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 3).await;
    store.upsert_item(&repo("tool", 1)).await.unwrap();
    store
        .update_enrichment("acme/tool", "A tool.", &["Developer Tools".to_string()])
        .await
        .unwrap();
    store
        .update_embedding("acme/tool", &[1.0, 0.0, 0.0])
        .await
        .unwrap();

    // A later fetch with more stars, a missing description, and no enrichment.
    let mut refetched = repo("tool", 99);
    refetched.description = None;
    refetched.topics = vec![];
    store.upsert_item(&refetched).await.unwrap();

    let got = &store.get_all().await.unwrap()[0];
    assert_eq!(got.stars, 99);
    assert!(got.topics.is_empty());
    assert_eq!(got.description.as_deref(), Some("tool does things"));
    assert_eq!(got.ai_summary.as_deref(), Some("A tool."));
    assert_eq!(
        got.ai_categories.as_deref(),
        Some(&["Developer Tools".to_string()][..])
    );
    assert!(got.enriched_at.is_some());
    assert_eq!(got.embedding.as_deref(), Some(&[1.0f32, 0.0, 0.0][..]));
}

#[tokio::test]
async fn test_selection_queries() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 3).await;
    for name in ["a", "b", "c"] {
        store.upsert_item(&repo(name, 1)).await.unwrap();
    }
    store.update_enrichment("acme/a", "A.", &[]).await.unwrap();
    store.update_enrichment("acme/b", "B.", &[]).await.unwrap();
    store.update_embedding("acme/a", &[0.0, 1.0, 0.0]).await.unwrap();

    let names = |items: Vec<Item>| items.into_iter().map(|i| i.full_name).collect::<Vec<_>>();
    assert_eq!(names(store.get_unenriched().await.unwrap()), vec!["acme/c"]);
    assert_eq!(
        names(store.get_needing_embedding().await.unwrap()),
        vec!["acme/b"]
    );

    let stats = store.stats().await.unwrap();
    assert_eq!((stats.total, stats.enriched, stats.embedded), (3, 2, 1));
}

#[tokio::test]
async fn test_wrong_dimensionality_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 3).await;
    store.upsert_item(&repo("tool", 1)).await.unwrap();
    let err = store
        .update_embedding("acme/tool", &[1.0, 2.0])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("dimensions"));
    assert_eq!(store.stats().await.unwrap().embedded, 0);
}

#[tokio::test]
async fn test_dimensionality_change_clears_embeddings() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir, 3).await;
        store.upsert_item(&repo("tool", 1)).await.unwrap();
        store.update_enrichment("acme/tool", "A.", &[]).await.unwrap();
        store
            .update_embedding("acme/tool", &[1.0, 0.0, 0.0])
            .await
            .unwrap();
        store.pool().close().await;
    }

    let store = open_store(&dir, 4).await;
    let stats = store.stats().await.unwrap();
    assert_eq!((stats.total, stats.enriched, stats.embedded), (1, 1, 0));
    assert_eq!(store.get_needing_embedding().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_search_ranks_and_projects() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 3).await;
    for (name, stars, vec) in [
        ("near", 10, [1.0f32, 0.0, 0.0]),
        ("mid", 500, [1.0, 1.0, 0.0]),
        ("far", 20, [0.0, 0.0, 1.0]),
    ] {
        store.upsert_item(&repo(name, stars)).await.unwrap();
        store
            .update_enrichment(&format!("acme/{}", name), name, &["RAG".to_string()])
            .await
            .unwrap();
        store
            .update_embedding(&format!("acme/{}", name), &vec)
            .await
            .unwrap();
    }
    // Not embedded: never a search result.
    store.upsert_item(&repo("pending", 1000)).await.unwrap();

    let options = SearchOptions::parse(2, "full_name,ai_categories", "").unwrap();
    let rows = store.search(&[1.0, 0.0, 0.0], &options).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].get("full_name").and_then(FieldValue::as_str),
        Some("acme/near")
    );
    assert_eq!(
        rows[1].get("full_name").and_then(FieldValue::as_str),
        Some("acme/mid")
    );
    assert!((rows[0].score() - 1.0).abs() < 1e-6);
    assert_eq!(
        rows[0].fields().collect::<Vec<_>>(),
        vec!["full_name", "ai_categories", "score"]
    );
    assert_eq!(
        rows[0].get("ai_categories").and_then(FieldValue::as_list),
        Some(&["RAG".to_string()][..])
    );

    let options = SearchOptions {
        limit: 3,
        fields: vec!["full_name".to_string()],
        sort: vec![SortClause::new("stars", SortDirection::Desc)],
    };
    let rows = store.search(&[1.0, 0.0, 0.0], &options).await.unwrap();
    let names: Vec<&str> = rows
        .iter()
        .filter_map(|r| r.get("full_name").and_then(FieldValue::as_str))
        .collect();
    assert_eq!(names, vec!["acme/mid", "acme/far", "acme/near"]);
    // The sort column is not requested, so it is not returned.
    assert!(rows[0].get("stars").is_none());
}

#[tokio::test]
async fn test_search_rejects_unknown_field_before_querying() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 3).await;
    let options = SearchOptions {
        fields: vec!["full_name".to_string(), "stars; DROP TABLE items".to_string()],
        ..Default::default()
    };
    let err = store.search(&[1.0, 0.0, 0.0], &options).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SearchError>(),
        Some(SearchError::UnknownField(_))
    ));

    // The table is still there.
    store.upsert_item(&repo("tool", 1)).await.unwrap();
    assert_eq!(store.stats().await.unwrap().total, 1);
}

#[tokio::test]
async fn test_category_breakdown() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 3).await;
    for name in ["x", "y", "z"] {
        store.upsert_item(&repo(name, 1)).await.unwrap();
    }
    store
        .update_enrichment("acme/x", "X.", &["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    store
        .update_enrichment("acme/y", "Y.", &["a".to_string()])
        .await
        .unwrap();

    let counts = store.category_breakdown().await.unwrap();
    assert_eq!(counts.len(), 2);
    assert_eq!(counts["a"], 2);
    assert_eq!(counts["b"], 1);
}
