//! Scripted collaborators shared by the end-to-end tests.
//!
//! `ScriptedInference` answers each agent from its own queue of canned
//! responses and `FakeRetrieval` serves search hits and pages from maps, so
//! a whole research turn runs without network access.

#![allow(dead_code)]

use async_trait::async_trait;
use company_research::agents::AgentRole;
use company_research::config::ResearchConfig;
use company_research::llm::{InferenceClient, ToolRunner};
use company_research::models::{FetchedPage, SearchHit, SourceType};
use company_research::search::{RetrievalTools, SearchError};
use company_research::types::{AppError, AppResult, CompletionRequest, LLMResponse, TokenUsage};
use company_research::ResearchDeps;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn role_of(request: &CompletionRequest) -> AgentRole {
    let prompt = request.system_prompt.as_str();
    if prompt.contains("precise research brief") {
        AgentRole::Disambiguation
    } else if prompt.contains("condense long documents") {
        AgentRole::Summarizer
    } else if prompt.contains("review a draft research report") {
        AgentRole::Critic
    } else {
        AgentRole::ReportWriter
    }
}

/// Canned model. Each agent role pops from its own queue; the last entry
/// repeats forever.
#[derive(Default)]
pub struct ScriptedInference {
    scripts: Mutex<HashMap<AgentRole, VecDeque<AppResult<String>>>>,
    requests: Mutex<Vec<(AgentRole, CompletionRequest)>>,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, role: AgentRole, response: impl Into<String>) -> Self {
        self.push(role, Ok(response.into()))
    }

    pub fn fail(self, role: AgentRole, error: AppError) -> Self {
        self.push(role, Err(error))
    }

    fn push(self, role: AgentRole, response: AppResult<String>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(role)
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self, role: AgentRole) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == role)
            .count()
    }

    pub fn requests_for(&self, role: AgentRole) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, req)| req.clone())
            .collect()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn complete(
        &self,
        request: &CompletionRequest,
        _tools: Option<&dyn ToolRunner>,
    ) -> AppResult<LLMResponse> {
        let role = role_of(request);
        self.requests.lock().unwrap().push((role, request.clone()));

        let next = {
            let mut scripts = self.scripts.lock().unwrap();
            let queue = scripts
                .get_mut(&role)
                .ok_or_else(|| AppError::Internal(format!("no script for {}", role)))?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };

        let content = next.ok_or_else(|| AppError::Internal(format!("empty script for {}", role)))??;
        Ok(LLMResponse {
            content,
            finish_reason: "stop".to_string(),
            usage: TokenUsage::default(),
        })
    }
}

/// Search and fetch served from maps. Unknown queries have no results,
/// unknown URLs are 404s.
#[derive(Default)]
pub struct FakeRetrieval {
    hits: HashMap<String, Vec<SearchHit>>,
    pages: HashMap<String, String>,
    slow_queries: HashMap<String, Duration>,
    searches: Mutex<Vec<String>>,
}

impl FakeRetrieval {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `query` returning one hit per `(url, text)` page.
    pub fn with_results(mut self, query: &str, pages: &[(&str, &str)]) -> Self {
        let hits = pages
            .iter()
            .map(|(url, text)| {
                self.pages.insert(url.to_string(), text.to_string());
                SearchHit {
                    title: format!("Page at {}", url),
                    url: url.to_string(),
                    snippet: String::new(),
                }
            })
            .collect();
        self.hits.insert(query.to_string(), hits);
        self
    }

    pub fn with_delay(mut self, query: &str, delay: Duration) -> Self {
        self.slow_queries.insert(query.to_string(), delay);
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetrievalTools for FakeRetrieval {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        self.searches.lock().unwrap().push(query.to_string());
        if let Some(delay) = self.slow_queries.get(query) {
            tokio::time::sleep(*delay).await;
        }
        self.hits.get(query).cloned().ok_or(SearchError::NoResults)
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage, SearchError> {
        let text = self
            .pages
            .get(url)
            .ok_or_else(|| SearchError::NotFound(url.to_string()))?;
        Ok(FetchedPage {
            url: url.to_string(),
            title: None,
            text: text.clone(),
            source_type: SourceType::Webpage,
        })
    }
}

pub fn plan(queries: &[&str]) -> String {
    json!({
        "kind": "search_plan",
        "user_intent_short": "Research the company",
        "user_intent_long": "Research the company's market position and competitors in detail.",
        "queries": queries,
    })
    .to_string()
}

pub fn question(text: &str) -> String {
    json!({ "kind": "clarifying_question", "question": text }).to_string()
}

pub fn draft(body: &str) -> String {
    json!({
        "kind": "report_draft",
        "title": "Market Overview",
        "body": body,
        "citations": [],
    })
    .to_string()
}

pub fn approval() -> String {
    json!({ "kind": "critique", "approved": true }).to_string()
}

pub fn rejection(detail: &str, recommended_queries: &[&str]) -> String {
    json!({
        "kind": "critique",
        "approved": false,
        "issues": [{ "category": "weak_sourcing", "detail": detail }],
        "recommended_queries": recommended_queries,
    })
    .to_string()
}

pub fn summary(text: &str) -> String {
    json!({ "kind": "summary", "text": text }).to_string()
}

/// Fast retries so transport tests do not wait on real backoff.
pub fn test_config() -> ResearchConfig {
    ResearchConfig {
        backoff_base_ms: 1,
        ..ResearchConfig::default()
    }
}

pub fn deps(
    client: Arc<ScriptedInference>,
    retrieval: Arc<FakeRetrieval>,
    config: ResearchConfig,
) -> ResearchDeps {
    ResearchDeps::new(client, retrieval, config, false).expect("valid test config")
}
