use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use star_sync_core::search::{DEFAULT_FIELDS, DEFAULT_LIMIT};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./stars.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// GraphQL node id of the star list (`UL_...`).
    pub list_id: String,
    #[serde(default = "default_github_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_source_max_retries")]
    pub max_retries: u32,
}

fn default_github_endpoint() -> String {
    "https://api.github.com/graphql".to_string()
}
fn default_page_size() -> u32 {
    100
}
fn default_source_timeout_secs() -> u64 {
    30
}
fn default_source_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_summarizer_model")]
    pub model: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_summarizer_max_retries")]
    pub max_retries: u32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_summarizer_model(),
            concurrency: default_concurrency(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_summarizer_max_retries(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_summarizer_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_concurrency() -> usize {
    5
}
fn default_temperature() -> f32 {
    0.3
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_summarizer_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_embedding_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_embedding_max_retries(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_batch_size() -> usize {
    256
}
fn default_embedding_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default = "default_search_fields")]
    pub fields: String,
    #[serde(default = "default_search_sort")]
    pub sort: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
            fields: default_search_fields(),
            sort: default_search_sort(),
        }
    }
}

fn default_search_limit() -> usize {
    DEFAULT_LIMIT
}
fn default_search_fields() -> String {
    DEFAULT_FIELDS.to_string()
}
fn default_search_sort() -> String {
    "score desc".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.source.list_id.trim().is_empty() {
        anyhow::bail!("source.list_id must not be empty");
    }
    if !(1..=100).contains(&config.source.page_size) {
        anyhow::bail!("source.page_size must be in [1, 100]");
    }

    if config.summarizer.concurrency == 0 {
        anyhow::bail!("summarizer.concurrency must be >= 1");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }

    if config.search.limit == 0 {
        anyhow::bail!("search.limit must be >= 1");
    }

    Ok(config)
}
