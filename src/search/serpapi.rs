//! SerpAPI Client
//!
//! Web search through SerpAPI's Google Light engine: fast organic results
//! with a title, link and snippet, which is all the research loop needs to
//! decide what to fetch.

use crate::models::SearchHit;
use serde_json::Value;
use serpapi_search_rust::serp_api_search::SerpApiSearch;
use std::collections::HashMap;
use tracing::{debug, info};

use super::SearchError;

/// SerpAPI client for general web search
pub struct SerpApiClient {
    api_key: String,
    max_results: usize,
}

impl SerpApiClient {
    /// Create a new SerpAPI client
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            max_results: 10,
        }
    }

    /// Configure client from config; `None` without a key.
    pub fn from_config(config: &crate::config::SearchConfig) -> Option<Self> {
        if config.serpapi_key.is_empty() {
            return None;
        }

        Some(Self {
            api_key: config.serpapi_key.clone(),
            max_results: config.max_results,
        })
    }

    /// Set maximum results per search
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Search Google Light for web results
    pub async fn search_light(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::NoApiKey);
        }

        info!(query = %query, "Searching Google Light via SerpAPI");

        let mut params = HashMap::<String, String>::new();
        params.insert("engine".to_string(), "google_light".to_string());
        params.insert("q".to_string(), query.to_string());
        params.insert("hl".to_string(), "en".to_string());
        params.insert("gl".to_string(), "us".to_string());
        params.insert("num".to_string(), self.max_results.to_string());

        let search = SerpApiSearch::google(params, self.api_key.clone());

        let results = search
            .json()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        debug!("Raw Light response received");

        let hits = parse_light_results(&results, self.max_results)?;
        info!(count = hits.len(), "Google Light search completed");
        Ok(hits)
    }
}

/// Turns a SerpAPI response into hits, dropping results without a link.
pub fn parse_light_results(results: &Value, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
    if let Some(error) = results.get("error").and_then(|v| v.as_str()) {
        return Err(SearchError::RequestFailed(error.to_string()));
    }

    let organic_results = results
        .get("organic_results")
        .ok_or(SearchError::NoResults)?;

    let results_array = organic_results
        .as_array()
        .ok_or_else(|| SearchError::ParseError("Expected array of results".to_string()))?;

    let hits: Vec<SearchHit> = results_array
        .iter()
        .filter_map(|result| {
            let url = result.get("link").and_then(|v| v.as_str())?.trim();
            if url.is_empty() {
                return None;
            }

            let title = result
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("Untitled")
                .to_string();

            let snippet = result
                .get("snippet")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            Some(SearchHit {
                title,
                url: url.to_string(),
                snippet,
            })
        })
        .take(max_results)
        .collect();

    if hits.is_empty() {
        return Err(SearchError::NoResults);
    }
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_light_results() {
        let raw = json!({
            "organic_results": [
                {"title": "Acme 10-K", "link": "https://acme.com/10k.pdf", "snippet": "Annual report"},
                {"title": "No link"},
                {"link": "https://news.com/acme"}
            ]
        });

        let hits = parse_light_results(&raw, 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Acme 10-K");
        assert_eq!(hits[1].title, "Untitled");
        assert_eq!(hits[1].snippet, "");
    }

    #[test]
    fn test_parse_respects_max_results() {
        let raw = json!({
            "organic_results": [
                {"title": "a", "link": "https://a.com"},
                {"title": "b", "link": "https://b.com"},
                {"title": "c", "link": "https://c.com"}
            ]
        });
        assert_eq!(parse_light_results(&raw, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_error_and_empty_responses() {
        assert_eq!(
            parse_light_results(&json!({"error": "Invalid API key"}), 10),
            Err(SearchError::RequestFailed("Invalid API key".to_string()))
        );
        assert_eq!(parse_light_results(&json!({}), 10), Err(SearchError::NoResults));
        assert_eq!(
            parse_light_results(&json!({"organic_results": []}), 10),
            Err(SearchError::NoResults)
        );
        assert!(matches!(
            parse_light_results(&json!({"organic_results": "x"}), 10),
            Err(SearchError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let client = SerpApiClient::new(String::new());
        assert_eq!(client.search_light("acme").await, Err(SearchError::NoApiKey));
    }
}
