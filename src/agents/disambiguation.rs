//! Disambiguation Agent
//!
//! Decides whether the user's request is precise enough to research. It
//! either asks a clarifying question, which ends the turn, or returns a
//! search plan with a refined brief and initial queries.

use super::{complete_structured, history_messages, prompts, AgentContext, AgentRole, SubAgent};
use crate::contract::{AgentOutput, ClarifyingQuestion, OutputKind, SearchPlan};
use crate::llm::{InferenceClient, SearchToolRunner, ToolRunner};
use crate::types::{AppError, AppResult, LLMMessage};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

const KINDS: [OutputKind; 2] = [OutputKind::ClarifyingQuestion, OutputKind::SearchPlan];

#[derive(Debug, Clone, PartialEq)]
pub enum Disambiguation {
    Clarify(ClarifyingQuestion),
    Proceed(SearchPlan),
}

pub struct DisambiguationAgent {
    client: Arc<dyn InferenceClient>,
    search: Option<SearchToolRunner>,
}

impl DisambiguationAgent {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self { client, search: None }
    }

    /// Lets the model look names up before deciding.
    pub fn with_search(mut self, search: SearchToolRunner) -> Self {
        self.search = Some(search);
        self
    }
}

#[async_trait]
impl SubAgent for DisambiguationAgent {
    type Input = String;
    type Output = Disambiguation;

    fn role(&self) -> AgentRole {
        AgentRole::Disambiguation
    }

    async fn invoke(&self, message: &String, ctx: AgentContext<'_>) -> AppResult<Disambiguation> {
        let mut messages = history_messages(ctx.history);
        messages.push(LLMMessage::user(message.as_str()));

        let tools = self.search.as_ref().map(|s| s as &dyn ToolRunner);
        let output = complete_structured(
            self.client.as_ref(),
            prompts::disambiguation_system_prompt(tools.is_some()),
            messages,
            &KINDS,
            ctx.correction,
            tools,
        )
        .await?;

        match output {
            AgentOutput::ClarifyingQuestion(question) => {
                info!(question = %question.question, "Request needs clarification");
                Ok(Disambiguation::Clarify(question))
            }
            AgentOutput::SearchPlan(plan) => {
                info!(intent = %plan.user_intent_short, queries = plan.queries.len(), "Request resolved");
                Ok(Disambiguation::Proceed(plan))
            }
            other => Err(AppError::SchemaViolation(format!(
                "disambiguation returned {}",
                other.kind()
            ))),
        }
    }
}
