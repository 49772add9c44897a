//! Report-Writer Agent
//!
//! Writes the report from the whole knowledge base, preferring summaries
//! over raw text. Sources are shown to the model under labels (`S1`, `S2`,
//! ...) and every marker in the draft is turned into a footnote through
//! `KnowledgeBase::cite`, so a report can only reference documents that are
//! actually stored.

use super::{complete_structured, prompts, AgentContext, AgentRole, SubAgent};
use crate::contract::{resolve_draft, AgentOutput, CritiqueIssue, OutputKind, ResearchReport};
use crate::knowledge_base::DocumentFilter;
use crate::llm::InferenceClient;
use crate::models::DocumentId;
use crate::types::{AppError, AppResult, LLMMessage};
use crate::utils::text::truncate_chars;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const KINDS: [OutputKind; 1] = [OutputKind::ReportDraft];
const DEFAULT_SOURCE_CHARS: usize = 24_000;

#[derive(Debug, Clone, Default)]
pub struct WriteInput {
    pub brief: String,
    /// Issues from the last critique, empty on the first draft.
    pub feedback: Vec<CritiqueIssue>,
}

pub struct ReportWriterAgent {
    client: Arc<dyn InferenceClient>,
    paragraphs: String,
    max_source_chars: usize,
}

impl ReportWriterAgent {
    pub fn new(client: Arc<dyn InferenceClient>, paragraphs: impl Into<String>) -> Self {
        Self {
            client,
            paragraphs: paragraphs.into(),
            max_source_chars: DEFAULT_SOURCE_CHARS,
        }
    }

    pub fn with_max_source_chars(mut self, max: usize) -> Self {
        self.max_source_chars = max;
        self
    }
}

fn format_feedback(feedback: &[CritiqueIssue]) -> String {
    if feedback.is_empty() {
        return String::new();
    }
    let mut output = String::from("\n\nA REVIEWER FLAGGED THESE ISSUES IN YOUR LAST DRAFT. FIX THEM:\n");
    for issue in feedback {
        output.push_str(&format!("- {}: {}\n", issue.category, issue.detail));
    }
    output
}

#[async_trait]
impl SubAgent for ReportWriterAgent {
    type Input = WriteInput;
    type Output = ResearchReport;

    fn role(&self) -> AgentRole {
        AgentRole::ReportWriter
    }

    async fn invoke(&self, input: &WriteInput, ctx: AgentContext<'_>) -> AppResult<ResearchReport> {
        let mut labels: HashMap<String, DocumentId> = HashMap::new();
        let mut documents = String::from("<documents>\n");
        for (i, doc) in ctx.knowledge_base.list_documents(DocumentFilter::all()).enumerate() {
            let label = format!("S{}", i + 1);
            documents.push_str(&format!(
                "  <document label=\"{}\">\n    <h1>{}</h1>\n    <url>{}</url>\n    <body>{}</body>\n  </document>\n",
                label,
                doc.title,
                doc.link(),
                truncate_chars(doc.best_text(), self.max_source_chars)
            ));
            labels.insert(label, doc.id.clone());
        }
        documents.push_str("</documents>");

        if labels.is_empty() {
            return Err(AppError::NotFound("no documents to write from".to_string()));
        }

        let prompt = format!(
            "USER BRIEF:\n{}\n\nDOCUMENTS:\n{}\nDo not make up any facts outside of these documents.{}",
            input.brief,
            documents,
            format_feedback(&input.feedback)
        );

        let output = complete_structured(
            self.client.as_ref(),
            prompts::writer_system_prompt(&self.paragraphs),
            vec![LLMMessage::user(prompt)],
            &KINDS,
            ctx.correction,
            None,
        )
        .await?;

        let AgentOutput::ReportDraft(draft) = output else {
            return Err(AppError::SchemaViolation(format!("report writer returned {}", output.kind())));
        };

        let report = resolve_draft(&draft, &labels, ctx.knowledge_base)?;
        info!(
            title = %report.title,
            footnotes = report.footnotes.len(),
            "Report drafted"
        );
        Ok(report)
    }
}
