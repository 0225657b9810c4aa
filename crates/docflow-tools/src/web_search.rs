use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use docflow_core::config::WebSearchConfig;
use docflow_core::error::{DocflowError, Result};
use docflow_core::traits::WebSearch;
use docflow_core::types::TextChunk;

use crate::splitter::RecursiveSplitter;

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// Tavily-backed web search. Each result's content is split on its own.
pub struct TavilySearch {
    api_key: String,
    http: reqwest::Client,
    splitter: RecursiveSplitter,
}

impl TavilySearch {
    pub fn new(api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            api_key: api_key.to_string(),
            http,
            splitter: RecursiveSplitter::default(),
        }
    }
}

/// Split the `content` of every result into chunks, in result order.
fn result_chunks(body: &serde_json::Value, splitter: &RecursiveSplitter) -> Vec<TextChunk> {
    body["results"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|r| r["content"].as_str())
                .flat_map(|content| splitter.split_text(content))
                .collect()
        })
        .unwrap_or_default()
}

impl WebSearch for TavilySearch {
    fn search<'a>(&'a self, query: &'a str, k: usize) -> BoxFuture<'a, Result<Vec<TextChunk>>> {
        Box::pin(async move {
            let resp = self
                .http
                .post(TAVILY_URL)
                .json(&json!({
                    "api_key": self.api_key,
                    "query": query,
                    "max_results": k,
                }))
                .send()
                .await
                .map_err(|e| DocflowError::WebSearch(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(DocflowError::WebSearch(format!("HTTP {}: {}", status, body)));
            }

            let body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| DocflowError::WebSearch(e.to_string()))?;

            let chunks = result_chunks(&body, &self.splitter);
            debug!(query, k, chunks = chunks.len(), "Web search complete");
            Ok(chunks)
        })
    }
}

/// Build the configured web search, or `None` when web retrieval is off.
pub fn create_web_search(config: Option<&WebSearchConfig>) -> Result<Option<Arc<dyn WebSearch>>> {
    let Some(config) = config.filter(|c| c.is_enabled()) else {
        return Ok(None);
    };
    match config.provider.as_str() {
        "tavily" => Ok(Some(Arc::new(TavilySearch::new(&config.api_key)))),
        other => Err(DocflowError::Config(format!(
            "unknown web_search provider '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_chunks() {
        let body = json!({
            "results": [
                {"title": "A", "url": "https://a", "content": "first result"},
                {"title": "no content"},
                {"title": "B", "url": "https://b", "content": "second result"}
            ]
        });
        let chunks = result_chunks(&body, &RecursiveSplitter::default());
        assert_eq!(chunks, vec!["first result", "second result"]);

        let long = json!({"results": [{"content": "word ".repeat(1000)}]});
        assert!(result_chunks(&long, &RecursiveSplitter::default()).len() > 1);

        assert!(result_chunks(&json!({}), &RecursiveSplitter::default()).is_empty());
    }

    #[test]
    fn test_create_web_search() {
        assert!(create_web_search(None).unwrap().is_none());

        let disabled = WebSearchConfig {
            provider: "tavily".into(),
            api_key: "${TAVILY_API_KEY}".into(),
        };
        assert!(create_web_search(Some(&disabled)).unwrap().is_none());

        let enabled = WebSearchConfig {
            provider: "tavily".into(),
            api_key: "tvly-123".into(),
        };
        assert!(create_web_search(Some(&enabled)).unwrap().is_some());

        let unknown = WebSearchConfig {
            provider: "bing".into(),
            api_key: "k".into(),
        };
        assert!(create_web_search(Some(&unknown)).is_err());
    }
}
