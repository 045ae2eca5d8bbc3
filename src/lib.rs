//! # Star Sync
//!
//! Synchronizes a GitHub star list into a searchable local store and
//! augments each repository with an AI summary, category tags, and an
//! embedding vector for similarity search.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ GitHub list │──▶│  Pipeline                │──▶│  SQLite   │
//! │ + JSON cache│   │ upsert → enrich → embed  │   │ items     │
//! └─────────────┘   └──────────┬───────────────┘   └────┬─────┘
//!                              │                        │
//!                   ┌──────────┴─────────┐              ▼
//!                   │ chat + embeddings  │        ┌──────────┐
//!                   │ (OpenAI-compatible)│        │   CLI    │
//!                   └────────────────────┘        │ (stars)  │
//!                                                 └──────────┘
//! ```
//!
//! The capability traits (`StarSource`, `Summarizer`, `Embedder`, `Store`)
//! and the fetch strategies live in `star-sync-core`; this crate provides
//! the concrete adapters, the concurrency around them, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite `Store` implementation |
//! | [`cache`] | JSON snapshot of the last fetched list |
//! | [`http`] | HTTP client and retry helper |
//! | [`github`] | GitHub GraphQL star list source |
//! | [`llm`] | Chat-completions summarizer |
//! | [`embedding`] | Embeddings provider |
//! | [`enrich`] | Bounded-concurrency enrichment |
//! | [`embed`] | Batched embedding |
//! | [`pipeline`] | Sync orchestration |
//! | [`progress`] | Progress reporting |
//! | [`search`] | `stars search` |
//! | [`stats`] | `stars stats` |

pub mod cache;
pub mod config;
pub mod db;
pub mod embed;
pub mod embedding;
pub mod enrich;
pub mod github;
pub mod http;
pub mod llm;
pub mod migrate;
pub mod pipeline;
pub mod progress;
pub mod search;
pub mod sqlite_store;
pub mod stats;
