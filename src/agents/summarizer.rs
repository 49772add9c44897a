//! Summarizer Agent
//!
//! Condenses one long document. The head of the text is kept verbatim and
//! only the remainder goes to the model; the stored summary is the head
//! followed by the model's extractive summary.

use super::{complete_structured, prompts, AgentContext, AgentRole, SubAgent};
use crate::contract::{AgentOutput, OutputKind};
use crate::llm::InferenceClient;
use crate::models::DocumentId;
use crate::types::{AppError, AppResult, LLMMessage};
use crate::utils::text::{split_at_chars, truncate_chars};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

const KINDS: [OutputKind; 1] = [OutputKind::Summary];

pub struct SummarizerAgent {
    client: Arc<dyn InferenceClient>,
    head_chars: usize,
    max_chars: usize,
}

impl SummarizerAgent {
    pub fn new(client: Arc<dyn InferenceClient>, head_chars: usize, max_chars: usize) -> Self {
        Self {
            client,
            head_chars,
            max_chars: max_chars.max(head_chars),
        }
    }
}

#[async_trait]
impl SubAgent for SummarizerAgent {
    type Input = DocumentId;
    /// The summary as attached to the document.
    type Output = String;

    fn role(&self) -> AgentRole {
        AgentRole::Summarizer
    }

    async fn invoke(&self, id: &DocumentId, ctx: AgentContext<'_>) -> AppResult<String> {
        let doc = ctx
            .knowledge_base
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("document {}", id)))?;

        let text = truncate_chars(&doc.text, self.max_chars);
        let (head, rest) = split_at_chars(text, self.head_chars);
        if rest.trim().is_empty() {
            // short enough to use as is
            return Ok(doc.text.clone());
        }

        let head = head.to_string();
        let prompt = format!("DOCUMENT TITLE: {}\n\nTEXT TO SUMMARIZE:\n{}", doc.title, rest);

        let output = complete_structured(
            self.client.as_ref(),
            prompts::summarizer_system_prompt(),
            vec![LLMMessage::user(prompt)],
            &KINDS,
            ctx.correction,
            None,
        )
        .await?;

        let AgentOutput::Summary(summary) = output else {
            return Err(AppError::SchemaViolation(format!("summarizer returned {}", output.kind())));
        };

        let combined = format!("{}\n\n[...]\n\n{}", head.trim_end(), summary.text.trim());
        ctx.knowledge_base.attach_summary(id, combined.clone())?;
        info!(document = %id, summary_chars = combined.len(), "Summary attached");
        Ok(combined)
    }
}
