//! Browser control tool - open pages and run web searches

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use url::form_urlencoded;

use super::{str_param, Tool, ToolResult};
use crate::adapters::desktop::Desktop;
use crate::Result;

const SEARCH_ENGINES: &[(&str, &str)] = &[
    ("baidu", "https://www.baidu.com/s?wd="),
    ("google", "https://www.google.com/search?q="),
    ("bing", "https://www.bing.com/search?q="),
];

/// Open URLs and search the web in the default browser
pub struct BrowserControlTool {
    desktop: Arc<dyn Desktop>,
    default_engine: String,
}

impl BrowserControlTool {
    pub fn new(desktop: Arc<dyn Desktop>, default_engine: &str) -> Self {
        Self {
            desktop,
            default_engine: default_engine.to_string(),
        }
    }

    /// Search URL for `query`; unknown engines fall back to baidu.
    pub fn search_url(engine: &str, query: &str) -> (String, &'static str) {
        let (name, base) = SEARCH_ENGINES
            .iter()
            .find(|(name, _)| *name == engine)
            .copied()
            .unwrap_or(SEARCH_ENGINES[0]);
        let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
        (format!("{base}{encoded}"), name)
    }

    fn normalize_url(url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{url}")
        }
    }

    async fn open(&self, url: &str) -> ToolResult {
        let url = Self::normalize_url(url);
        if self.desktop.open_url(&url).await {
            ToolResult::success_with(format!("Opened in browser: {url}"), json!({"url": url}))
        } else {
            ToolResult::failure(format!("Failed to open URL: {url}"), "Failed to open URL")
        }
    }

    async fn search(&self, query: &str, engine: &str) -> ToolResult {
        let (url, engine) = Self::search_url(engine, query);
        if self.desktop.open_url(&url).await {
            ToolResult::success_with(
                format!("Searched {engine} for: {query}"),
                json!({"query": query, "engine": engine, "url": url}),
            )
        } else {
            ToolResult::failure(format!("Search failed: {query}"), "Failed to search")
        }
    }
}

/// A bare domain such as `bilibili.com` that can stand in for a URL.
fn looks_like_domain(text: &str) -> bool {
    text.contains('.') && !text.contains(char::is_whitespace)
}

#[async_trait]
impl Tool for BrowserControlTool {
    fn name(&self) -> &str { "browser_control" }
    fn description(&self) -> &str { "Control the web browser: open a URL or search the web" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["open", "search"],
                    "description": "open = open a URL, search = search the web"
                },
                "url": {
                    "type": "string",
                    "description": "URL to open (for open)"
                },
                "query": {
                    "type": "string",
                    "description": "Search keywords (for search)"
                },
                "engine": {
                    "type": "string",
                    "enum": ["baidu", "google", "bing"],
                    "description": "Search engine, defaults to the configured engine"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let action = str_param(&params, "action").unwrap_or_default();
        let query = str_param(&params, "query");

        Ok(match action {
            "open" => {
                let url = str_param(&params, "url")
                    .or_else(|| query.filter(|q| looks_like_domain(q)));
                match url {
                    Some(url) => self.open(url).await,
                    None => ToolResult::failure("No URL specified", "No URL provided"),
                }
            }
            "search" => match query {
                Some(query) => {
                    let engine = str_param(&params, "engine").unwrap_or(self.default_engine.as_str());
                    self.search(query, engine).await
                }
                None => ToolResult::failure("No search keywords specified", "No query provided"),
            },
            other => ToolResult::failure(format!("Unsupported action: {other}"), "Invalid action"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::desktop::FakeDesktop;

    fn tool() -> (BrowserControlTool, Arc<FakeDesktop>) {
        let desktop = Arc::new(FakeDesktop::new());
        (BrowserControlTool::new(desktop.clone(), "baidu"), desktop)
    }

    #[tokio::test]
    async fn test_open_prepends_scheme() {
        let (tool, desktop) = tool();
        let result = tool.execute(json!({"action": "open", "url": "www.baidu.com"})).await.unwrap();
        assert!(result.success);
        assert_eq!(desktop.opened(), vec!["https://www.baidu.com"]);
    }

    #[tokio::test]
    async fn test_open_falls_back_to_domain_query() {
        let (tool, desktop) = tool();
        let result = tool.execute(json!({"action": "open", "query": "bilibili.com"})).await.unwrap();
        assert!(result.success);
        assert_eq!(desktop.opened(), vec!["https://bilibili.com"]);

        let result = tool.execute(json!({"action": "open", "query": "天气"})).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_search_encodes_query() {
        let (tool, desktop) = tool();
        let result = tool.execute(json!({"action": "search", "query": "rust 教程", "engine": "bing"}))
            .await.unwrap();
        assert!(result.success);
        let opened = desktop.opened();
        assert!(opened[0].starts_with("https://www.bing.com/search?q=rust+"));
        assert!(!opened[0].contains(' '));
    }

    #[test]
    fn test_unknown_engine_uses_baidu() {
        let (url, engine) = BrowserControlTool::search_url("altavista", "x");
        assert_eq!(engine, "baidu");
        assert_eq!(url, "https://www.baidu.com/s?wd=x");
    }

    #[tokio::test]
    async fn test_open_failure_reported() {
        let desktop = Arc::new(FakeDesktop::new().failing_opens());
        let tool = BrowserControlTool::new(desktop, "baidu");
        let result = tool.execute(json!({"action": "search", "query": "x"})).await.unwrap();
        assert!(!result.success);
    }
}
