//! Critic Agent
//!
//! Reviews a draft report against the brief and the knowledge base. It
//! either approves the draft or lists issues; it never edits the report.

use super::{complete_structured, prompts, AgentContext, AgentRole, SubAgent};
use crate::contract::{AgentOutput, Critique, OutputKind, ResearchReport};
use crate::knowledge_base::DocumentFilter;
use crate::llm::InferenceClient;
use crate::types::{AppError, AppResult, LLMMessage};
use crate::utils::text::truncate_chars;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

const KINDS: [OutputKind; 1] = [OutputKind::Critique];
const EXCERPT_CHARS: usize = 1_500;

#[derive(Debug, Clone)]
pub struct CritiqueInput {
    pub brief: String,
    pub draft: ResearchReport,
}

pub struct CriticAgent {
    client: Arc<dyn InferenceClient>,
}

impl CriticAgent {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SubAgent for CriticAgent {
    type Input = CritiqueInput;
    type Output = Critique;

    fn role(&self) -> AgentRole {
        AgentRole::Critic
    }

    async fn invoke(&self, input: &CritiqueInput, ctx: AgentContext<'_>) -> AppResult<Critique> {
        let mut documents = String::from("<documents>\n");
        for doc in ctx.knowledge_base.list_documents(DocumentFilter::all()) {
            documents.push_str(&format!(
                "  <document>\n    <h1>{}</h1>\n    <url>{}</url>\n    <body>{}</body>\n  </document>\n",
                doc.title,
                doc.link(),
                truncate_chars(doc.best_text(), EXCERPT_CHARS)
            ));
        }
        documents.push_str("</documents>");

        let prompt = format!(
            "USER BRIEF:\n{}\n\nSOURCE DOCUMENTS:\n{}\n\nDRAFT REPORT:\n{}",
            input.brief,
            documents,
            input.draft.to_markdown()
        );

        let output = complete_structured(
            self.client.as_ref(),
            prompts::critic_system_prompt(),
            vec![LLMMessage::user(prompt)],
            &KINDS,
            ctx.correction,
            None,
        )
        .await?;

        let AgentOutput::Critique(critique) = output else {
            return Err(AppError::SchemaViolation(format!("critic returned {}", output.kind())));
        };

        info!(
            approved = critique.approved,
            issues = critique.issues.len(),
            recommended_queries = critique.recommended_queries.len(),
            "Critique received"
        );
        Ok(critique)
    }
}
