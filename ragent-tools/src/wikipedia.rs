//! `wikipedia`: general world knowledge from Wikipedia.
//!
//! Lookup is two steps against the public APIs: a MediaWiki full-text search
//! for candidate titles, then the REST page-summary endpoint for each title.
//! Pages whose summary cannot be fetched (missing, disambiguation) are
//! skipped.

use crate::registry::{Tool, required_str};
use async_trait::async_trait;
use ragent_core::config::KnowledgeConfig;
use ragent_core::error::ToolError;
use ragent_core::types::ToolOutput;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Returned when the search yields nothing usable.
pub const NO_RESULT: &str = "No good Wikipedia Search Result was found";

/// Queries longer than this are truncated before searching.
const MAX_QUERY_CHARS: usize = 300;

const TOOL_NAME: &str = "wikipedia";

/// A source of general-knowledge text for a query.
#[async_trait]
pub trait KnowledgeLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<String, ToolError>;
}

/// One page summary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PageSummary {
    pub title: String,
    #[serde(default)]
    pub extract: String,
}

/// Render summaries as `Page: <title>\nSummary: <extract>` blocks, capped at
/// `max_chars` characters.
pub fn format_summaries(pages: &[PageSummary], max_chars: usize) -> String {
    let text = pages
        .iter()
        .filter(|p| !p.extract.trim().is_empty())
        .map(|p| format!("Page: {}\nSummary: {}", p.title, p.extract))
        .collect::<Vec<_>>()
        .join("\n\n");
    if text.is_empty() {
        return NO_RESULT.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

fn failed(message: String) -> ToolError {
    ToolError::ExecutionFailed {
        name: TOOL_NAME.to_string(),
        message,
    }
}

/// [`KnowledgeLookup`] backed by the Wikipedia HTTP APIs.
#[derive(Debug, Clone)]
pub struct WikipediaLookup {
    base_url: String,
    top_k_results: usize,
    max_chars: usize,
    timeout: Duration,
}

impl WikipediaLookup {
    pub fn new(config: &KnowledgeConfig) -> Self {
        Self {
            base_url: format!("https://{}.wikipedia.org", config.lang),
            top_k_results: config.top_k_results.max(1),
            max_chars: config.max_chars,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Point at a different host, e.g. a mirror.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn search_url(&self, query: &str) -> String {
        let query: String = query.chars().take(MAX_QUERY_CHARS).collect();
        format!(
            "{}/w/api.php?action=query&list=search&format=json&utf8=1&srlimit={}&srsearch={}",
            self.base_url,
            self.top_k_results,
            urlencoding::encode(&query)
        )
    }

    pub fn summary_url(&self, title: &str) -> String {
        format!(
            "{}/api/rest_v1/page/summary/{}",
            self.base_url,
            urlencoding::encode(&title.replace(' ', "_"))
        )
    }

    fn client(&self) -> Result<reqwest::Client, ToolError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(format!("Ragent/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| failed(format!("Failed to create HTTP client: {}", e)))
    }

    async fn search(
        &self,
        client: &reqwest::Client,
        query: &str,
    ) -> Result<Vec<String>, ToolError> {
        let response = client
            .get(self.search_url(query))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| failed(format!("Wikipedia search failed: {}", e)))?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("Failed to parse search response: {}", e)))?;
        Ok(body
            .query
            .map(|q| q.search.into_iter().map(|h| h.title).collect())
            .unwrap_or_default())
    }

    async fn summary(&self, client: &reqwest::Client, title: &str) -> Option<PageSummary> {
        let response = match client.get(self.summary_url(title)).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(title, status = %r.status(), "Skipping page without summary");
                return None;
            }
            Err(e) => {
                warn!(title, error = %e, "Summary request failed");
                return None;
            }
        };
        response.json::<PageSummary>().await.ok()
    }
}

#[async_trait]
impl KnowledgeLookup for WikipediaLookup {
    async fn lookup(&self, query: &str) -> Result<String, ToolError> {
        let client = self.client()?;
        let titles = self.search(&client, query).await?;
        debug!(query, titles = titles.len(), "Wikipedia search");

        let mut pages = Vec::with_capacity(titles.len());
        for title in titles.iter().take(self.top_k_results) {
            if let Some(page) = self.summary(&client, title).await {
                pages.push(page);
            }
        }
        Ok(format_summaries(&pages, self.max_chars))
    }
}

/// Search Wikipedia for general knowledge.
pub struct ExternalKnowledgeTool {
    lookup: Arc<dyn KnowledgeLookup>,
}

impl ExternalKnowledgeTool {
    pub fn new(lookup: Arc<dyn KnowledgeLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl Tool for ExternalKnowledgeTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search Wikipedia for general knowledge. Use only for facts about the world \
         that are not in the user's documents."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Topic or question to look up"
                }
            },
            "required": ["query"]
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(45)
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = required_str(TOOL_NAME, &args, "query")?;
        let text = self.lookup.lookup(query).await?;
        Ok(ToolOutput::text(text))
    }
}
