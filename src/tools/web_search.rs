//! Web search tool backed by DuckDuckGo's HTML results page (no API key
//! required, matching the zero-configuration search this tool mirrors).

use super::{BoxFuture, ToolProvider};
use crate::llm::ToolCall;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::json;

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const DEFAULT_MAX_RESULTS: u32 = 5;

#[derive(Debug, Deserialize)]
struct WebSearchRequest {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: u32,
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Clone)]
pub struct WebSearchTool {
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn run_search(&self, query: &str, max_results: u32) -> Result<Vec<SearchResult>, String> {
        let response = self
            .client
            .post(SEARCH_URL)
            .form(&[("q", query)])
            .header("User-Agent", "Mozilla/5.0 (compatible; agent-runtime/1.0)")
            .send()
            .await
            .map_err(|e| format!("Search request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("Search provider returned status {}", response.status()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read search response: {e}"))?;

        Ok(parse_results(&body, max_results as usize))
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let result_selector = Selector::parse("div.result").unwrap();
    let title_selector = Selector::parse("a.result__a").unwrap();
    let snippet_selector = Selector::parse("a.result__snippet, div.result__snippet").unwrap();

    let mut results = Vec::new();
    for node in document.select(&result_selector) {
        if results.len() >= max_results {
            break;
        }
        let Some(title_el) = node.select(&title_selector).next() else {
            continue;
        };
        let title: String = title_el.text().collect::<String>().trim().to_string();
        let url = title_el.value().attr("href").unwrap_or("").to_string();
        if title.is_empty() || url.is_empty() {
            continue;
        }
        let snippet = node
            .select(&snippet_selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        results.push(SearchResult { title, url, snippet });
    }
    results
}

impl ToolProvider for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn brief(&self) -> &str {
        "🔍 SEARCH THE WEB: find current information online. Use for facts, docs, or anything outside training data."
    }

    fn full_description(&self) -> String {
        format!(
            "{} Returns a ranked list of titles, URLs, and snippets.",
            self.brief()
        )
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 5)",
                    "default": DEFAULT_MAX_RESULTS
                }
            },
            "required": ["query"]
        })
    }

    fn execute<'a>(&'a self, call: &'a ToolCall) -> BoxFuture<'a, Result<String, String>> {
        Box::pin(async move {
            let request: WebSearchRequest = serde_json::from_value(call.arguments.clone())
                .map_err(|e| format!("Invalid arguments: {e}"))?;

            let results = self
                .run_search(&request.query, request.max_results.max(1))
                .await?;

            if results.is_empty() {
                let result = json!({
                    "success": false,
                    "error": format!("No results found for '{}'", request.query),
                });
                return Ok(result.to_string());
            }

            let formatted = results
                .iter()
                .enumerate()
                .map(|(i, r)| format!("{}. {}\n   {}\n   {}", i + 1, r.title, r.url, r.snippet))
                .collect::<Vec<_>>()
                .join("\n\n");

            let result = json!({
                "success": true,
                "result": formatted,
                "results": results,
                "count": results.len(),
                "summary": format!("found {} results for '{}'", results.len(), request.query),
            });
            Ok(result.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_results_extracts_fields() {
        let html = r#"
            <div class="result">
                <a class="result__a" href="https://example.com">Example Title</a>
                <a class="result__snippet">An example snippet.</a>
            </div>
            <div class="result">
                <a class="result__a" href="https://example.org">Second Title</a>
                <a class="result__snippet">Another snippet.</a>
            </div>
        "#;
        let results = parse_results(html, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Example Title");
        assert_eq!(results[0].url, "https://example.com");
        assert_eq!(results[0].snippet, "An example snippet.");
    }

    #[test]
    fn test_parse_results_respects_max() {
        let html = r#"
            <div class="result"><a class="result__a" href="https://a.com">A</a></div>
            <div class="result"><a class="result__a" href="https://b.com">B</a></div>
            <div class="result"><a class="result__a" href="https://c.com">C</a></div>
        "#;
        let results = parse_results(html, 2);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_parse_results_empty() {
        let results = parse_results("<html><body>no results</body></html>", 5);
        assert!(results.is_empty());
    }
}
