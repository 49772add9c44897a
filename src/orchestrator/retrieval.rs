// Retrieval pass: concurrent search and fetch, single-writer upsert

use crate::config::ResearchConfig;
use crate::knowledge_base::KnowledgeBase;
use crate::models::{Document, DocumentId, SearchHit};
use crate::search::{RetrievalTools, SearchError};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tokio::time::timeout;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalReport {
    pub queries_run: usize,
    pub queries_failed: usize,
    pub fetches_failed: usize,
    pub documents_added: Vec<DocumentId>,
}

impl RetrievalReport {
    /// Folds a later pass into this one.
    pub fn absorb(&mut self, other: RetrievalReport) {
        self.queries_run += other.queries_run;
        self.queries_failed += other.queries_failed;
        self.fetches_failed += other.fetches_failed;
        self.documents_added.extend(other.documents_added);
    }

    pub fn had_failures(&self) -> bool {
        self.queries_failed > 0 || self.fetches_failed > 0
    }

    /// Reader-facing note for a report written from partial retrieval.
    pub fn caveat(&self) -> Option<String> {
        if !self.had_failures() {
            return None;
        }
        Some(format!(
            "{} of {} searches and {} page download(s) failed; the report may be missing sources.",
            self.queries_failed, self.queries_run, self.fetches_failed
        ))
    }
}

struct Candidate {
    hit: SearchHit,
    relevance: f32,
}

/// Trimmed, case-insensitively deduplicated, capped at `max`.
fn plan_queries(queries: &[String], max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    queries
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty() && seen.insert(q.to_lowercase()))
        .take(max)
        .map(str::to_string)
        .collect()
}

/// Runs `queries` and stores what could be fetched.
///
/// Searches and fetches run concurrently, each under its own timeout; a
/// failed or timed-out call is logged and skipped. All knowledge base writes
/// happen afterwards on this task, one at a time, in query order.
pub async fn retrieve(
    queries: &[String],
    tools: &dyn RetrievalTools,
    kb: &mut KnowledgeBase,
    config: &ResearchConfig,
) -> RetrievalReport {
    let queries = plan_queries(queries, config.max_queries);
    let limit = config.retrieval_timeout();
    let mut report = RetrievalReport {
        queries_run: queries.len(),
        ..RetrievalReport::default()
    };

    let searches: Vec<(String, Result<Vec<SearchHit>, SearchError>)> = stream::iter(queries)
        .map(|query| async move {
            let result = match timeout(limit, tools.search(&query)).await {
                Ok(result) => result,
                Err(_) => Err(SearchError::Timeout(format!("search '{}'", query))),
            };
            (query, result)
        })
        .buffered(config.retrieval_concurrency)
        .collect()
        .await;

    // pick fetch targets in query order, skipping anything already known
    let mut chosen: HashSet<DocumentId> = HashSet::new();
    let mut candidates: Vec<Candidate> = Vec::new();
    for (query, result) in searches {
        let hits = match result {
            Ok(hits) => hits,
            Err(e) => {
                report.queries_failed += 1;
                warn!(query = %query, error = %e, "Search failed, skipping query");
                continue;
            }
        };
        info!(query = %query, hits = hits.len(), "Search completed");

        let mut taken = 0;
        for (rank, hit) in hits.into_iter().enumerate() {
            if taken >= config.fetch_per_query {
                break;
            }
            let id = DocumentId::for_url(&hit.url);
            if kb.contains(&id) || !chosen.insert(id) {
                continue;
            }
            candidates.push(Candidate {
                hit,
                relevance: 1.0 / (rank as f32 + 1.0),
            });
            taken += 1;
        }
    }

    let fetched: Vec<_> = stream::iter(candidates)
        .map(|candidate| async move {
            let result = match timeout(limit, tools.fetch(&candidate.hit.url)).await {
                Ok(result) => result,
                Err(_) => Err(SearchError::Timeout(format!("fetch {}", candidate.hit.url))),
            };
            (candidate, result)
        })
        .buffered(config.retrieval_concurrency)
        .collect()
        .await;

    for (candidate, result) in fetched {
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                report.fetches_failed += 1;
                warn!(url = %candidate.hit.url, error = %e, "Fetch failed, skipping document");
                continue;
            }
        };

        let title = page
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(candidate.hit.title);
        let doc = Document::from_url(&candidate.hit.url, title, page.text, page.source_type)
            .with_relevance(candidate.relevance);
        let stored = kb.add_or_update_document(doc);
        report.documents_added.push(stored.id.clone());
    }

    info!(
        queries = report.queries_run,
        failed_queries = report.queries_failed,
        failed_fetches = report.fetches_failed,
        added = report.documents_added.len(),
        total = kb.len(),
        "Retrieval pass finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchedPage, SourceType};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StaticRetrieval {
        hits: HashMap<String, Vec<&'static str>>,
        broken_urls: Vec<&'static str>,
    }

    #[async_trait]
    impl RetrievalTools for StaticRetrieval {
        async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
            let urls = self.hits.get(query).ok_or(SearchError::NoResults)?;
            Ok(urls
                .iter()
                .map(|u| SearchHit {
                    title: format!("hit {}", u),
                    url: u.to_string(),
                    snippet: String::new(),
                })
                .collect())
        }

        async fn fetch(&self, url: &str) -> Result<FetchedPage, SearchError> {
            if self.broken_urls.contains(&url) {
                return Err(SearchError::NotFound(url.to_string()));
            }
            Ok(FetchedPage {
                url: url.to_string(),
                title: None,
                text: format!("content of {}", url),
                source_type: SourceType::Webpage,
            })
        }
    }

    #[test]
    fn test_plan_queries() {
        let queries = vec![
            " Acme revenue ".to_string(),
            "acme REVENUE".to_string(),
            "".to_string(),
            "Acme CEO".to_string(),
            "Acme debt".to_string(),
        ];
        assert_eq!(plan_queries(&queries, 2), vec!["Acme revenue", "Acme CEO"]);
    }

    #[tokio::test]
    async fn test_retrieve_dedupes_and_skips_failures() {
        let tools = StaticRetrieval {
            hits: HashMap::from([
                ("q1".to_string(), vec!["https://a.com", "https://b.com", "https://c.com"]),
                ("q2".to_string(), vec!["https://a.com/#top", "https://d.com"]),
            ]),
            broken_urls: vec!["https://d.com"],
        };
        let mut kb = KnowledgeBase::new();
        let config = ResearchConfig::default();

        let queries = vec!["q1".to_string(), "q2".to_string(), "missing".to_string()];
        let report = retrieve(&queries, &tools, &mut kb, &config).await;

        assert_eq!(report.queries_run, 3);
        assert_eq!(report.queries_failed, 1);
        assert_eq!(report.fetches_failed, 1);
        assert_eq!(kb.len(), 2);

        let titles: Vec<&str> = kb
            .list_documents(Default::default())
            .map(|d| d.title.as_str())
            .collect();
        assert_eq!(titles, vec!["hit https://a.com", "hit https://b.com"]);
        assert_eq!(kb.list_documents(Default::default()).next().unwrap().relevance, Some(1.0));
    }

    #[test]
    fn test_caveat_only_after_failures() {
        let mut report = RetrievalReport {
            queries_run: 2,
            ..RetrievalReport::default()
        };
        assert_eq!(report.caveat(), None);

        report.absorb(RetrievalReport {
            queries_run: 1,
            queries_failed: 1,
            fetches_failed: 2,
            documents_added: vec![],
        });
        assert_eq!(
            report.caveat().as_deref(),
            Some("1 of 3 searches and 2 page download(s) failed; the report may be missing sources.")
        );
    }

    #[tokio::test]
    async fn test_known_documents_are_not_refetched() {
        let tools = StaticRetrieval {
            hits: HashMap::from([("q".to_string(), vec!["https://a.com"])]),
            broken_urls: vec![],
        };
        let mut kb = KnowledgeBase::new();
        let config = ResearchConfig::default();

        retrieve(&["q".to_string()], &tools, &mut kb, &config).await;
        let again = retrieve(&["q".to_string()], &tools, &mut kb, &config).await;
        assert!(again.documents_added.is_empty());
        assert_eq!(kb.len(), 1);
    }
}
