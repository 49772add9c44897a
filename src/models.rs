// Data models shared by the knowledge base, agents and orchestrator

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of a retrieved document: its normalized URL, or a content hash
/// for material that has no URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn for_url(url: &str) -> Self {
        Self(normalize_url(url))
    }

    pub fn for_content(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        Self(format!("sha256:{}", hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheme and host are lowercased by `Url`; fragments never identify a different page.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let Ok(mut parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    parsed.set_fragment(None);

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }
    parsed.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Webpage,
    Pdf,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Webpage => write!(f, "webpage"),
            SourceType::Pdf => write!(f, "pdf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub text: String,
    pub source_type: SourceType,
    pub retrieved_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f32>,
}

impl Document {
    /// Builds a document identified by its URL.
    pub fn from_url(
        url: &str,
        title: impl Into<String>,
        text: impl Into<String>,
        source_type: SourceType,
    ) -> Self {
        Self {
            id: DocumentId::for_url(url),
            title: title.into(),
            url: Some(url.trim().to_string()),
            text: text.into(),
            source_type,
            retrieved_at: Utc::now(),
            summary: None,
            relevance: None,
        }
    }

    /// Builds a document identified by the hash of its text.
    pub fn from_text(title: impl Into<String>, text: impl Into<String>, source_type: SourceType) -> Self {
        let text = text.into();
        Self {
            id: DocumentId::for_content(&text),
            title: title.into(),
            url: None,
            text,
            source_type,
            retrieved_at: Utc::now(),
            summary: None,
            relevance: None,
        }
    }

    pub fn with_relevance(mut self, relevance: f32) -> Self {
        self.relevance = Some(relevance);
        self
    }

    /// Summary when one is attached, raw text otherwise.
    pub fn best_text(&self) -> &str {
        self.summary.as_deref().unwrap_or(&self.text)
    }

    pub fn has_summary(&self) -> bool {
        self.summary.is_some()
    }

    pub fn link(&self) -> String {
        self.url.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// A search engine hit before the page is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Extracted content of a downloaded page or PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub source_type: SourceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Ordered user/assistant turns. Append-only: extending returns a new history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn extended(&self, turns: impl IntoIterator<Item = Turn>) -> Self {
        let mut next = self.clone();
        next.turns.extend(turns);
        next
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_identity_ignores_fragment_and_case() {
        let a = DocumentId::for_url("https://Example.com/about/#team");
        let b = DocumentId::for_url("https://example.com/about");
        assert_eq!(a, b);

        let c = DocumentId::for_url("https://example.com/about?lang=de");
        assert_ne!(a, c);
    }

    #[test]
    fn test_unparseable_url_is_kept_trimmed() {
        assert_eq!(normalize_url("  not a url "), "not a url");
    }

    #[test]
    fn test_content_identity() {
        let a = DocumentId::for_content("annual report");
        let b = DocumentId::for_content("annual report");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("sha256:"));
        assert_ne!(a, DocumentId::for_content("quarterly report"));
    }

    #[test]
    fn test_best_text_prefers_summary() {
        let mut doc = Document::from_url("https://a.com", "A", "long text", SourceType::Webpage);
        assert_eq!(doc.best_text(), "long text");
        doc.summary = Some("short".to_string());
        assert_eq!(doc.best_text(), "short");
        assert_eq!(doc.link(), "https://a.com");
    }

    #[test]
    fn test_history_extended_leaves_original_untouched() {
        let history = ConversationHistory::new();
        let next = history.extended([Turn::user("hi"), Turn::assistant("hello")]);
        assert!(history.is_empty());
        assert_eq!(next.len(), 2);
        assert_eq!(next.last_user_message(), Some("hi"));
    }
}
