//! Knowledge Base
//!
//! Session-scoped store of retrieved documents and the citation index that
//! binds report footnotes to them.
//!
//! - Documents are keyed by [`DocumentId`]; re-adding an identity merges into
//!   the stored entry instead of duplicating it.
//! - Citation indices start at 1, are handed out in the order documents are
//!   first cited, and are never reassigned.
//!
//! All mutation goes through the methods below, which keeps the citation
//! index monotonic no matter which agent touches the store.

use crate::models::{Document, DocumentId, SourceType};
use crate::types::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub index: u32,
    pub document_id: DocumentId,
    pub excerpt: String,
    pub link: String,
    pub title: String,
}

/// Rendered footnote as it is appended to a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footnote {
    pub index: u32,
    pub excerpt: String,
    pub link: String,
    pub title: String,
}

impl From<&Citation> for Footnote {
    fn from(citation: &Citation) -> Self {
        Self {
            index: citation.index,
            excerpt: citation.excerpt.clone(),
            link: citation.link.clone(),
            title: citation.title.clone(),
        }
    }
}

impl fmt::Display for Footnote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[^{}]: {} [link]({})", self.index, self.excerpt, self.link)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SummaryFilter {
    #[default]
    Any,
    Present,
    Absent,
}

/// Selection used by [`KnowledgeBase::list_documents`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    pub source_type: Option<SourceType>,
    pub summary: SummaryFilter,
}

impl DocumentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn unsummarized() -> Self {
        Self {
            source_type: None,
            summary: SummaryFilter::Absent,
        }
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = Some(source_type);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        let type_ok = self.source_type.map_or(true, |t| doc.source_type == t);
        let summary_ok = match self.summary {
            SummaryFilter::Any => true,
            SummaryFilter::Present => doc.has_summary(),
            SummaryFilter::Absent => !doc.has_summary(),
        };
        type_ok && summary_ok
    }
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    documents: Vec<Document>,
    by_id: HashMap<DocumentId, usize>,
    citations: Vec<Citation>,
    cited: HashMap<DocumentId, u32>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.by_id.get(id).map(|&pos| &self.documents[pos])
    }

    /// Keyed upsert. A changed text drops the stale summary; the stored
    /// entry keeps its position so listing order stays stable.
    pub fn add_or_update_document(&mut self, doc: Document) -> &Document {
        if let Some(&pos) = self.by_id.get(&doc.id) {
            let stored = &mut self.documents[pos];
            if stored.text != doc.text {
                debug!(document = %doc.id, "Document content changed, clearing summary");
                stored.text = doc.text;
                stored.summary = None;
            }
            if !doc.title.trim().is_empty() {
                stored.title = doc.title;
            }
            if doc.url.is_some() {
                stored.url = doc.url;
            }
            if doc.summary.is_some() {
                stored.summary = doc.summary;
            }
            stored.source_type = doc.source_type;
            stored.retrieved_at = doc.retrieved_at;
            stored.relevance = doc.relevance.or(stored.relevance);
            return &self.documents[pos];
        }

        let pos = self.documents.len();
        self.by_id.insert(doc.id.clone(), pos);
        self.documents.push(doc);
        &self.documents[pos]
    }

    pub fn attach_summary(&mut self, id: &DocumentId, summary: impl Into<String>) -> AppResult<()> {
        let pos = *self
            .by_id
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("document {}", id)))?;
        self.documents[pos].summary = Some(summary.into());
        Ok(())
    }

    /// Returns the footnote index for `id`, allocating the next one on first
    /// reference. Later calls for the same document keep the first excerpt.
    pub fn cite(&mut self, id: &DocumentId, excerpt: &str) -> AppResult<u32> {
        if let Some(&index) = self.cited.get(id) {
            return Ok(index);
        }

        let doc = self
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("document {}", id)))?;

        let index = self.citations.len() as u32 + 1;
        let excerpt = if excerpt.trim().is_empty() {
            doc.title.clone()
        } else {
            excerpt.trim().to_string()
        };
        let citation = Citation {
            index,
            document_id: id.clone(),
            excerpt,
            link: doc.link(),
            title: doc.title.clone(),
        };

        debug!(document = %id, index, "Allocated citation");
        self.citations.push(citation);
        self.cited.insert(id.clone(), index);
        Ok(index)
    }

    pub fn citation(&self, index: u32) -> Option<&Citation> {
        if index == 0 {
            return None;
        }
        self.citations.get(index as usize - 1)
    }

    pub fn citation_for(&self, id: &DocumentId) -> Option<u32> {
        self.cited.get(id).copied()
    }

    pub fn citation_count(&self) -> usize {
        self.citations.len()
    }

    /// Every citation in index order.
    pub fn render_footnotes(&self) -> Vec<Footnote> {
        self.citations.iter().map(Footnote::from).collect()
    }

    /// Footnotes for the given indices, sorted and deduplicated.
    pub fn render_footnotes_for(&self, indices: &[u32]) -> AppResult<Vec<Footnote>> {
        let mut wanted: Vec<u32> = indices.to_vec();
        wanted.sort_unstable();
        wanted.dedup();

        wanted
            .into_iter()
            .map(|i| {
                self.citation(i)
                    .map(Footnote::from)
                    .ok_or_else(|| AppError::NotFound(format!("citation [^{}]", i)))
            })
            .collect()
    }

    /// Lazy, restartable view over the stored documents in insertion order.
    /// Cloning the returned iterator restarts it from the same position.
    pub fn list_documents(
        &self,
        filter: DocumentFilter,
    ) -> impl Iterator<Item = &Document> + Clone + '_ {
        self.documents.iter().filter(move |d| filter.matches(d))
    }
}
