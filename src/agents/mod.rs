//! Sub-agent adapters
//!
//! Each adapter wraps one inference call, the tools it may use and the
//! output kinds it accepts. Adapters never retry: they classify failures
//! (transport vs. schema violation) and the orchestrator decides what to do.
//! They touch the knowledge base only through its public methods and never
//! write conversation history.

pub mod critic;
pub mod disambiguation;
pub mod prompts;
pub mod report_writer;
pub mod summarizer;

pub use critic::{CriticAgent, CritiqueInput};
pub use disambiguation::{Disambiguation, DisambiguationAgent};
pub use report_writer::{ReportWriterAgent, WriteInput};
pub use summarizer::SummarizerAgent;

use crate::contract::{output_schema, parse_output, AgentOutput, OutputKind};
use crate::knowledge_base::KnowledgeBase;
use crate::llm::{InferenceClient, ToolRunner};
use crate::models::{ConversationHistory, Role};
use crate::types::{AppResult, CompletionRequest, LLMMessage};
use async_trait::async_trait;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Disambiguation,
    Summarizer,
    Critic,
    ReportWriter,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentRole::Disambiguation => write!(f, "disambiguation"),
            AgentRole::Summarizer => write!(f, "summarizer"),
            AgentRole::Critic => write!(f, "critic"),
            AgentRole::ReportWriter => write!(f, "report_writer"),
        }
    }
}

/// Borrowed session state handed to one adapter invocation.
pub struct AgentContext<'a> {
    pub knowledge_base: &'a mut KnowledgeBase,
    pub history: &'a ConversationHistory,
    /// Validation error from the previous attempt, when re-prompting.
    pub correction: Option<&'a str>,
}

/// `invoke(input, knowledge_base, history) -> result`. Composition is plain
/// function composition: anything implementing this can stand in for an agent.
#[async_trait]
pub trait SubAgent: Send + Sync {
    type Input: Send + Sync;
    type Output: Send;

    fn role(&self) -> AgentRole;

    async fn invoke(&self, input: &Self::Input, ctx: AgentContext<'_>) -> AppResult<Self::Output>;
}

/// Prior turns as chat messages.
pub(crate) fn history_messages(history: &ConversationHistory) -> Vec<LLMMessage> {
    history
        .turns()
        .iter()
        .map(|turn| match turn.role {
            Role::User => LLMMessage::user(&turn.content),
            Role::Assistant => LLMMessage::assistant(&turn.content),
        })
        .collect()
}

/// One inference call constrained to `kinds`, parsed and validated.
pub(crate) async fn complete_structured(
    client: &dyn InferenceClient,
    system_prompt: String,
    mut messages: Vec<LLMMessage>,
    kinds: &[OutputKind],
    correction: Option<&str>,
    tools: Option<&dyn ToolRunner>,
) -> AppResult<AgentOutput> {
    if let Some(error) = correction {
        messages.push(LLMMessage::user(prompts::correction(error, kinds)));
    }

    let mut request = CompletionRequest::new(system_prompt, messages)
        .with_output_schema(output_schema(kinds)?)
        .with_temperature(0.2);
    if let Some(runner) = tools {
        request = request.with_tools(runner.specs());
    }

    let response = client.complete(&request, tools).await?;
    debug!(chars = response.content.len(), finish_reason = %response.finish_reason, "Agent response received");
    parse_output(&response.content, kinds)
}
