//! # Star Sync CLI (`stars`)
//!
//! The `stars` binary syncs a GitHub star list into a local SQLite store,
//! enriches each repository with an AI summary, categories, and an
//! embedding, and searches the result by similarity.
//!
//! ## Usage
//!
//! ```bash
//! stars --config ./config/stars.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `stars init` | Create the SQLite database and schema |
//! | `stars sync` | Fetch, upsert, enrich, and embed the star list |
//! | `stars search "<query>"` | Similarity search over enriched items |
//! | `stars stats` | Totals and category breakdown |
//!
//! ## Environment
//!
//! `GITHUB_TOKEN`, `LLM_API_KEY`, and `EMBEDDING_API_KEY` (falls back to
//! `LLM_API_KEY`). Log verbosity follows `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use star_sync::config;
use star_sync::migrate;
use star_sync::pipeline::{self, SyncOptions};
use star_sync::progress::ProgressMode;
use star_sync::search::{self, SearchArgs};
use star_sync::stats;

/// Keep a searchable, AI-enriched copy of a GitHub star list.
#[derive(Parser)]
#[command(
    name = "stars",
    about = "Sync, enrich, and search a GitHub star list",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/stars.toml`.
    #[arg(long, global = true, default_value = "./config/stars.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; safe to run repeatedly.
    Init,

    /// Sync the star list into the store and enrich it.
    ///
    /// Uses the local cache with an incremental fetch when available,
    /// otherwise fetches the whole list. Press Ctrl-C to cancel; work
    /// already stored is kept.
    Sync {
        /// Upsert only; do not call the summarizer.
        #[arg(long)]
        skip_enrich: bool,

        /// Re-summarize and re-embed every item.
        #[arg(long)]
        force: bool,

        /// Ignore the cache and fetch the whole list.
        #[arg(long)]
        refresh: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Search enriched items by similarity to a query.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, short = 'k')]
        limit: Option<usize>,

        /// Comma-separated result fields (`score` is always included).
        #[arg(long)]
        fields: Option<String>,

        /// Comma-separated sort clauses, e.g. `"stars desc, full_name"`.
        #[arg(long)]
        sort: Option<String>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show store totals and the category breakdown.
    Stats {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync {
            skip_enrich,
            force,
            refresh,
            progress,
        } => {
            let options = SyncOptions {
                skip_enrichment: skip_enrich,
                force_reenrich: force,
                force_refetch: refresh,
            };
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            pipeline::run_sync(&cfg, options, mode).await?;
        }
        Commands::Search {
            query,
            limit,
            fields,
            sort,
            json,
        } => {
            let args = SearchArgs {
                limit,
                fields,
                sort,
                json,
            };
            search::run_search(&cfg, &query, &args).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
    }

    Ok(())
}
