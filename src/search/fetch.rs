//! Page download and text extraction
//!
//! HTML is parsed with `scraper` and reduced to its visible text; PDFs are
//! read with `lopdf`. Connection failures, timeouts, 429 and 5xx responses
//! are retried with exponential backoff. A page that yields no text is a
//! failure so that empty documents never reach the knowledge base.

use crate::models::{FetchedPage, SourceType};
use crate::utils::retry::{with_retry, RetryPolicy};
use crate::utils::text::compact_ws;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info};

use super::SearchError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

const SKIPPED_ELEMENTS: [&str; 9] = [
    "script", "style", "noscript", "nav", "header", "footer", "svg", "form", "template",
];

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid script regex"));

pub struct WebFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl WebFetcher {
    pub fn new(timeout: Duration, retries: u32) -> Result<Self, SearchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: Self::retry_policy(retries),
        })
    }

    /// `retries` extra attempts after the first, one second base backoff.
    pub fn retry_policy(retries: u32) -> RetryPolicy {
        RetryPolicy::new(retries + 1, Duration::from_secs(1))
    }

    pub fn from_config(config: &crate::config::SearchConfig) -> Result<Self, SearchError> {
        Self::new(Duration::from_secs(config.fetch_timeout_secs), config.fetch_retries)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, SearchError> {
        info!(url = %url, "Attempting fetch");
        with_retry(|| self.fetch_once(url), self.retry, is_retryable).await
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedPage, SearchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout(url.to_string())
            } else {
                SearchError::RequestFailed(format!("{}: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, url));
        }

        let is_pdf = url_is_pdf(url)
            || response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map_or(false, |ct| ct.contains("application/pdf"));

        let page = if is_pdf {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| SearchError::RequestFailed(format!("{}: {}", url, e)))?;
            FetchedPage {
                url: url.to_string(),
                title: None,
                text: extract_pdf_text(&bytes)?,
                source_type: SourceType::Pdf,
            }
        } else {
            let html = response
                .text()
                .await
                .map_err(|e| SearchError::RequestFailed(format!("{}: {}", url, e)))?;
            let (title, text) = extract_html(&html);
            FetchedPage {
                url: url.to_string(),
                title,
                text,
                source_type: SourceType::Webpage,
            }
        };

        if page.text.trim().is_empty() {
            return Err(SearchError::ParseError(format!("no text extracted from {}", url)));
        }
        debug!(url = %url, chars = page.text.len(), source_type = %page.source_type, "Fetched document");
        Ok(page)
    }
}

fn is_retryable(error: &SearchError) -> bool {
    matches!(error, SearchError::RequestFailed(_) | SearchError::Timeout(_))
}

fn classify_status(status: StatusCode, url: &str) -> SearchError {
    match status {
        StatusCode::REQUEST_TIMEOUT => SearchError::Timeout(url.to_string()),
        StatusCode::TOO_MANY_REQUESTS => SearchError::RequestFailed(format!("{} rate limited", url)),
        s if s.is_server_error() => SearchError::RequestFailed(format!("{} returned {}", url, s)),
        s => SearchError::NotFound(format!("{} returned {}", url, s)),
    }
}

fn url_is_pdf(url: &str) -> bool {
    let path = reqwest::Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    path.ends_with(".pdf")
}

/// Title and visible text of an HTML page. Falls back to crude tag stripping
/// when the structured walk finds nothing.
pub fn extract_html(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|t| compact_ws(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let root = ["article", "main", "body"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element());

    let mut text = visible_text(root);
    if text.is_empty() {
        text = compact_ws(&TAG.replace_all(&SCRIPT.replace_all(html, " "), " "));
    }
    (title, text)
}

fn visible_text(root: ElementRef<'_>) -> String {
    let mut pieces: Vec<String> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map_or(false, |e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let piece = compact_ws(text);
        if !piece.is_empty() {
            pieces.push(piece);
        }
    }
    pieces.join("\n")
}

pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, SearchError> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|e| SearchError::ParseError(format!("invalid PDF: {}", e)))?;

    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Err(SearchError::ParseError("PDF has no pages".to_string()));
    }

    document
        .extract_text(&pages)
        .map_err(|e| SearchError::ParseError(format!("PDF text extraction failed: {}", e)))
}
