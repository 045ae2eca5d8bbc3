//! GitHub star list source over the GraphQL API.
//!
//! Pages through `UserList.items` with Relay cursors in either direction and
//! maps each repository node onto an [`Item`]. Requires `GITHUB_TOKEN`.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use star_sync_core::models::{readme_excerpt, Item, Page, PageInfo};
use star_sync_core::source::{Direction, StarSource};

use crate::config::SourceConfig;
use crate::http;

/// Supports both forward (`first`/`after`) and backward (`last`/`before`)
/// pagination through nullable variables.
const PAGE_QUERY: &str = r#"
query($listId: ID!, $first: Int, $after: String, $last: Int, $before: String) {
  node(id: $listId) {
    ... on UserList {
      items(first: $first, after: $after, last: $last, before: $before) {
        totalCount
        pageInfo {
          hasNextPage
          endCursor
          hasPreviousPage
          startCursor
        }
        nodes {
          ... on Repository {
            owner { login }
            name
            description
            url
            homepageUrl
            stargazerCount
            primaryLanguage { name }
            repositoryTopics(first: 20) {
              nodes { topic { name } }
            }
            object(expression: "HEAD:README.md") {
              ... on Blob { text }
            }
          }
        }
      }
    }
  }
}
"#;

/// [`StarSource`] backed by one GitHub star list.
pub struct GitHubStarSource {
    client: Client,
    token: String,
    endpoint: String,
    list_id: String,
    page_size: u32,
    max_retries: u32,
}

impl GitHubStarSource {
    /// Build from config, reading `GITHUB_TOKEN` from the environment.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let token = http::require_env("GITHUB_TOKEN")?;
        Self::with_token(config, token)
    }

    pub fn with_token(config: &SourceConfig, token: String) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            token,
            endpoint: config.endpoint.clone(),
            list_id: config.list_id.clone(),
            page_size: config.page_size,
            max_retries: config.max_retries,
        })
    }

    fn variables(&self, cursor: Option<&str>, direction: Direction) -> serde_json::Value {
        match direction {
            Direction::Forward => json!({
                "listId": self.list_id,
                "first": self.page_size,
                "after": cursor,
            }),
            Direction::Backward => json!({
                "listId": self.list_id,
                "last": self.page_size,
                "before": cursor,
            }),
        }
    }
}

#[async_trait]
impl StarSource for GitHubStarSource {
    async fn fetch_page(&self, cursor: Option<&str>, direction: Direction) -> Result<Page> {
        let body = json!({
            "query": PAGE_QUERY,
            "variables": self.variables(cursor, direction),
        });

        let response = http::send_with_retry("GitHub", self.max_retries, || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.token)
                .json(&body)
        })
        .await?;

        let parsed: GraphQlResponse = response
            .json()
            .await
            .context("Failed to parse GitHub GraphQL response")?;

        parse_page(parsed)
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<StarListData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StarListData {
    node: Option<ListNode>,
}

#[derive(Debug, Deserialize)]
struct ListNode {
    items: Option<ItemConnection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemConnection {
    total_count: u64,
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<RepoNode>,
}

#[derive(Debug, Deserialize)]
struct Login {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TopicNode {
    topic: Named,
}

#[derive(Debug, Default, Deserialize)]
struct TopicConnection {
    #[serde(default)]
    nodes: Vec<TopicNode>,
}

#[derive(Debug, Deserialize)]
struct Blob {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoNode {
    // Absent on list entries that are not repositories.
    #[serde(default)]
    owner: Option<Login>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    homepage_url: Option<String>,
    #[serde(default)]
    stargazer_count: i64,
    #[serde(default)]
    primary_language: Option<Named>,
    #[serde(default)]
    repository_topics: TopicConnection,
    #[serde(default)]
    object: Option<Blob>,
}

fn parse_page(resp: GraphQlResponse) -> Result<Page> {
    if let Some(first) = resp.errors.first() {
        bail!("GitHub GraphQL error: {}", first.message);
    }

    let items = resp
        .data
        .and_then(|d| d.node)
        .and_then(|n| n.items)
        .ok_or_else(|| anyhow!("star list not found (check source.list_id)"))?;

    let fetched_at = Utc::now();
    let repos = items
        .nodes
        .into_iter()
        .filter_map(|node| {
            let mut item = node_to_item(node)?;
            item.fetched_at = Some(fetched_at);
            Some(item)
        })
        .collect();

    Ok(Page {
        items: repos,
        total_count: items.total_count,
        page_info: items.page_info,
    })
}

/// `None` for nodes that are not repositories.
fn node_to_item(node: RepoNode) -> Option<Item> {
    let (Some(owner), Some(name), Some(url)) = (node.owner, node.name, node.url) else {
        debug!("skipping non-repository list entry");
        return None;
    };
    let mut item = Item::new(owner.login, name, url);
    item.description = node.description.filter(|d| !d.is_empty());
    item.homepage_url = node.homepage_url.filter(|h| !h.is_empty());
    item.stars = node.stargazer_count;
    item.language = node.primary_language.map(|l| l.name);
    item.topics = node
        .repository_topics
        .nodes
        .into_iter()
        .map(|t| t.topic.name)
        .collect();
    item.readme_excerpt = node
        .object
        .and_then(|o| o.text)
        .and_then(|t| readme_excerpt(&t));
    Some(item)
}
