//! Web search tool — answers from a canned index.
//!
//! Queries are matched against topic keywords; unknown queries get generic
//! numbered hits. Extra topics can be registered for tests and demos.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stepwise_core::error::ToolError;
use stepwise_core::tool::{Tool, ToolOutput};
use tracing::debug;

const DEFAULT_LIMIT: usize = 3;
const MAX_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchHit {
    pub fn new(title: &str, url: &str, snippet: &str) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

pub struct WebSearchTool {
    topics: Vec<(String, Vec<SearchHit>)>,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            topics: vec![
                (
                    "rust".into(),
                    vec![
                        SearchHit::new(
                            "The Rust Programming Language",
                            "https://doc.rust-lang.org/book/",
                            "Rust is a systems programming language focused on safety, speed, and concurrency.",
                        ),
                        SearchHit::new(
                            "Rust by Example",
                            "https://doc.rust-lang.org/rust-by-example/",
                            "Runnable examples that illustrate Rust concepts and standard library usage.",
                        ),
                    ],
                ),
                (
                    "weather".into(),
                    vec![SearchHit::new(
                        "Weather Forecast - National Weather Service",
                        "https://weather.gov/",
                        "Current conditions and forecasts for locations across the United States.",
                    )],
                ),
            ],
        }
    }

    /// Register canned hits for queries containing `keyword`.
    /// Later registrations take precedence.
    pub fn with_topic(mut self, keyword: &str, hits: Vec<SearchHit>) -> Self {
        self.topics.insert(0, (keyword.to_lowercase(), hits));
        self
    }

    fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let needle = query.to_lowercase();
        if let Some((keyword, hits)) = self.topics.iter().find(|(k, _)| needle.contains(k.as_str())) {
            debug!(keyword = %keyword, "web_search matched canned topic");
            return hits.iter().take(limit).cloned().collect();
        }

        (1..=limit)
            .map(|page| SearchHit {
                title: format!("Result {page} for: {query}"),
                url: format!("https://example.com/search?q={}&p={page}", query.replace(' ', "+")),
                snippet: format!("Placeholder result for '{query}'."),
            })
            .collect()
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns a list of results with titles, URLs, and snippets."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of results (default 3)"
                }
            },
            "required": ["query"]
        })
    }

    async fn run(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let input: SearchInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        if input.query.trim().is_empty() {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: "query is empty".into(),
            });
        }

        let limit = input.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let hits = self.search(&input.query, limit);
        let data = serde_json::to_value(&hits).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })?;
        Ok(ToolOutput::json(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_topic_returns_canned_hits() {
        let out = WebSearchTool::new()
            .run(serde_json::json!({"query": "Learning Rust"}))
            .await
            .unwrap();
        assert!(out.text_content().contains("The Rust Programming Language"));
        assert_eq!(out.data.unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn limit_is_clamped() {
        let out = WebSearchTool::new()
            .run(serde_json::json!({"query": "anything", "limit": 50}))
            .await
            .unwrap();
        assert_eq!(out.data.unwrap().as_array().unwrap().len(), MAX_LIMIT);
    }

    #[tokio::test]
    async fn custom_topic_wins() {
        let tool = WebSearchTool::new().with_topic(
            "rust",
            vec![SearchHit::new("Custom", "https://custom.test", "custom hit")],
        );
        let out = tool.run(serde_json::json!({"query": "rust"})).await.unwrap();
        assert!(out.text_content().contains("Custom"));
    }

    #[tokio::test]
    async fn empty_query_fails() {
        let err = WebSearchTool::new()
            .run(serde_json::json!({"query": "  "}))
            .await
            .unwrap_err();
        assert_eq!(err.tool_name(), Some("web_search"));
    }

    #[tokio::test]
    async fn missing_query_is_invalid() {
        let err = WebSearchTool::new().run(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
