//! # Star Sync Core
//!
//! Runtime-agnostic logic for Star Sync: the item model, the source and
//! fetch-strategy abstraction, the summarizer and embedder traits, search
//! options with the field allow-list, and the store abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Concrete
//! adapters live in the `star-sync` app crate.

pub mod embedding;
pub mod models;
pub mod search;
pub mod source;
pub mod store;
pub mod summarize;
