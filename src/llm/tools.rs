// Tools the model may call during a completion

use crate::search::RetrievalTools;
use crate::types::{AppError, AppResult, ToolSpec};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Executes tool calls requested by the model. Results go back to the model
/// as plain text.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    fn specs(&self) -> Vec<ToolSpec>;

    async fn run(&self, name: &str, arguments: &Value) -> AppResult<String>;
}

/// Read-only `web_search` tool. It lets the disambiguation agent look up
/// what a name could refer to; results never enter the knowledge base.
pub struct SearchToolRunner {
    retrieval: Arc<dyn RetrievalTools>,
    max_hits: usize,
}

impl SearchToolRunner {
    pub const TOOL_NAME: &'static str = "web_search";

    pub fn new(retrieval: Arc<dyn RetrievalTools>) -> Self {
        Self {
            retrieval,
            max_hits: 5,
        }
    }

    pub fn with_max_hits(mut self, max_hits: usize) -> Self {
        self.max_hits = max_hits.max(1);
        self
    }
}

#[async_trait]
impl ToolRunner for SearchToolRunner {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![ToolSpec {
            name: Self::TOOL_NAME.to_string(),
            description: "Search the web and return titles, links and snippets. Use it to check what a company or topic name may refer to.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }),
        }]
    }

    async fn run(&self, name: &str, arguments: &Value) -> AppResult<String> {
        if name != Self::TOOL_NAME {
            return Err(AppError::NotFound(format!("Tool not found: {}", name)));
        }

        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::SchemaViolation("web_search requires a 'query' string".to_string()))?;

        info!(query = %query, "Disambiguation web search");
        match self.retrieval.search(query).await {
            Ok(hits) => {
                let lines: Vec<String> = hits
                    .iter()
                    .take(self.max_hits)
                    .enumerate()
                    .map(|(i, h)| format!("{}. {} ({})\n   {}", i + 1, h.title, h.url, h.snippet))
                    .collect();
                Ok(lines.join("\n"))
            }
            Err(e) => {
                warn!(query = %query, error = %e, "Disambiguation web search failed");
                Ok(format!("Search failed: {}", e))
            }
        }
    }
}
