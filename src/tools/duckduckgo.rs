//! DuckDuckGo search toolkit.
//!
//! Provides web search and news search via DuckDuckGo's HTML interface.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::tool::{parse_args, Tool, ToolRegistry};

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// DuckDuckGo search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub href: String,
    pub body: String,
}

/// Configuration for DuckDuckGo tools
#[derive(Clone)]
pub struct DuckDuckGoConfig {
    pub max_results: usize,
    pub timeout_secs: u64,
    pub endpoint: String,
}

impl Default for DuckDuckGoConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            timeout_secs: 10,
            endpoint: SEARCH_ENDPOINT.to_string(),
        }
    }
}

/// Create a DuckDuckGo toolkit with search and news tools
pub fn duckduckgo_toolkit(config: DuckDuckGoConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(DuckDuckGoSearchTool {
        config: config.clone(),
    });
    registry.register(DuckDuckGoNewsTool { config });
    registry
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    max_results: Option<usize>,
}

fn search_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "The search query" },
            "max_results": { "type": "integer", "description": "Maximum number of results (default 5)" }
        },
        "required": ["query"]
    })
}

struct DuckDuckGoSearchTool {
    config: DuckDuckGoConfig,
}

#[async_trait]
impl Tool for DuckDuckGoSearchTool {
    fn name(&self) -> &str {
        "duckduckgo_search"
    }

    fn description(&self) -> &str {
        "Search the web using DuckDuckGo and return titles, links and snippets."
    }

    fn parameters(&self) -> Option<Value> {
        Some(search_parameters())
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: SearchArgs = parse_args(self.name(), input)?;
        let max_results = args.max_results.unwrap_or(self.config.max_results);

        let results = search_duckduckgo(&self.config, self.name(), &args.query, max_results).await?;
        Ok(json!({ "query": args.query, "results": results }))
    }
}

struct DuckDuckGoNewsTool {
    config: DuckDuckGoConfig,
}

#[async_trait]
impl Tool for DuckDuckGoNewsTool {
    fn name(&self) -> &str {
        "duckduckgo_news"
    }

    fn description(&self) -> &str {
        "Get the latest news for a topic from DuckDuckGo."
    }

    fn parameters(&self) -> Option<Value> {
        Some(search_parameters())
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: SearchArgs = parse_args(self.name(), input)?;
        let max_results = args.max_results.unwrap_or(self.config.max_results);

        // The HTML endpoint has no news vertical; bias the query instead.
        let query = format!("{} news", args.query);
        let results = search_duckduckgo(&self.config, self.name(), &query, max_results).await?;
        Ok(json!({ "query": args.query, "results": results }))
    }
}

/// Perform a DuckDuckGo search using the HTML interface
async fn search_duckduckgo(
    config: &DuckDuckGoConfig,
    tool: &str,
    query: &str,
    max_results: usize,
) -> Result<Vec<SearchResult>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent("Mozilla/5.0 (compatible; AgentCourse/0.1)")
        .build()
        .map_err(|e| AgentError::tool(tool, e))?;

    let url = format!("{}?q={}", config.endpoint, urlencoding::encode(query));
    debug!(tool, query, "duckduckgo request");

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| AgentError::tool(tool, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AgentError::tool(
            tool,
            std::io::Error::other(format!("DuckDuckGo returned {status}")),
        ));
    }

    let html = response.text().await.map_err(|e| AgentError::tool(tool, e))?;
    Ok(parse_duckduckgo_html(&html, max_results))
}

/// Parse DuckDuckGo HTML response to extract search results
fn parse_duckduckgo_html(html: &str, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    // Each result is an <a class="result__a" href="...">title</a>, followed
    // by an optional <a class="result__snippet" ...>body</a>.
    for chunk in html.split("class=\"result__a\"").skip(1) {
        if results.len() >= max_results {
            break;
        }

        let raw_href = chunk
            .split("href=\"")
            .nth(1)
            .and_then(|s| s.split('"').next())
            .unwrap_or("");
        let href = resolve_redirect(&html_decode(raw_href));

        let title = chunk
            .split_once('>')
            .and_then(|(_, rest)| rest.split("</a>").next())
            .map(|s| html_decode(&strip_tags(s)))
            .unwrap_or_default();

        let body = chunk
            .split("result__snippet")
            .nth(1)
            .and_then(|s| s.split_once('>'))
            .and_then(|(_, rest)| rest.split("</a>").next())
            .map(|s| html_decode(&strip_tags(s)))
            .unwrap_or_default();

        if !title.is_empty() && href.starts_with("http") {
            results.push(SearchResult {
                title: title.trim().to_string(),
                href,
                body: body.trim().to_string(),
            });
        }
    }

    results
}

/// DuckDuckGo wraps result links as `//duckduckgo.com/l/?uddg=<encoded>`.
fn resolve_redirect(href: &str) -> String {
    if let Some(encoded) = href.split("uddg=").nth(1) {
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        if let Ok(decoded) = urlencoding::decode(encoded) {
            return decoded.into_owned();
        }
    }
    href.to_string()
}

fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Simple HTML entity decoding
pub(crate) fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
}
