//! Search Module
//!
//! Retrieval tools used by the orchestrator and the disambiguation agent:
//! - `serpapi`: Google Light web search through SerpAPI
//! - `fetch`: page download with HTML and PDF text extraction
//! - `web`: both of the above behind one rate limiter

pub mod fetch;
pub mod serpapi;
pub mod web;

pub use fetch::WebFetcher;
pub use serpapi::SerpApiClient;
pub use web::WebRetrieval;

use crate::models::{FetchedPage, SearchHit};
use crate::types::AppError;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during search and fetch operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("SerpAPI key not configured")]
    NoApiKey,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to parse content: {0}")]
    ParseError(String),

    #[error("No results found for query")]
    NoResults,
}

impl From<SearchError> for AppError {
    fn from(error: SearchError) -> Self {
        AppError::Retrieval(error.to_string())
    }
}

/// `search(query)` and `fetch(url)`. Failures are reported per call and
/// never end a research session.
#[async_trait]
pub trait RetrievalTools: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError>;

    async fn fetch(&self, url: &str) -> Result<FetchedPage, SearchError>;
}
