//! Research Orchestrator
//!
//! Drives one user turn through the research state machine:
//!
//! ```text
//! AwaitingIntent -> Clarifying -> Retrieving -> Summarizing? -> Writing <-> Critiquing? -> Done
//!                       |
//!                       +-> AwaitingIntent (clarifying question returned)
//! ```
//!
//! The orchestrator owns the knowledge base for the session and is the only
//! place where retry, skip and degrade decisions are made:
//!
//! - schema violations get one corrective re-prompt, then a degraded outcome
//! - transport failures are retried with backoff up to `inference_retries`,
//!   then the turn fails with the error
//! - retrieval failures are logged and skipped, and a report built without
//!   them carries a caveat saying so

pub mod retrieval;

pub use retrieval::{retrieve, RetrievalReport};

use crate::agents::{
    AgentContext, CriticAgent, CritiqueInput, Disambiguation, DisambiguationAgent, ReportWriterAgent,
    SubAgent, SummarizerAgent, WriteInput,
};
use crate::config::{Config, ResearchConfig};
use crate::contract::{
    validate_report, Critique, CritiqueIssue, IntermediateStatus, ResearchReport,
    SearchPlan, StatusCode, StructuredResult,
};
use crate::knowledge_base::{DocumentFilter, KnowledgeBase};
use crate::llm::{InferenceClient, SearchToolRunner, LLM};
use crate::models::{ConversationHistory, DocumentId, Turn};
use crate::search::{RetrievalTools, WebRetrieval};
use crate::types::{AppError, AppResult};
use crate::utils::retry::RetryPolicy;
use crate::utils::text::char_len;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingIntent,
    Clarifying,
    Retrieving,
    Summarizing,
    Writing,
    Critiquing,
    Done,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (AwaitingIntent, Clarifying)
                | (Clarifying, AwaitingIntent)
                | (Clarifying, Retrieving)
                | (Retrieving, Summarizing)
                | (Retrieving, Writing)
                | (Retrieving, Done)
                | (Summarizing, Writing)
                | (Writing, Critiquing)
                | (Writing, Done)
                | (Critiquing, Writing)
                | (Critiquing, Retrieving)
                | (Critiquing, Done)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AwaitingIntent => "awaiting_intent",
            SessionState::Clarifying => "clarifying",
            SessionState::Retrieving => "retrieving",
            SessionState::Summarizing => "summarizing",
            SessionState::Writing => "writing",
            SessionState::Critiquing => "critiquing",
            SessionState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Everything a turn needs. The knowledge base lives here for the whole
/// conversation; the agents and tools are shared, stateless handles.
pub struct ResearchDeps {
    pub knowledge_base: KnowledgeBase,
    pub disambiguation: Arc<dyn SubAgent<Input = String, Output = Disambiguation>>,
    pub summarizer: Arc<dyn SubAgent<Input = DocumentId, Output = String>>,
    pub critic: Arc<dyn SubAgent<Input = CritiqueInput, Output = Critique>>,
    pub report_writer: Arc<dyn SubAgent<Input = WriteInput, Output = ResearchReport>>,
    pub retrieval: Arc<dyn RetrievalTools>,
    pub config: ResearchConfig,
}

impl ResearchDeps {
    /// Standard agents over one inference client. With `search_during_disambiguation`
    /// the disambiguation agent may call `web_search` through `retrieval`.
    /// Fails with [`AppError::Config`] when `config` does not validate.
    pub fn new(
        client: Arc<dyn InferenceClient>,
        retrieval: Arc<dyn RetrievalTools>,
        config: ResearchConfig,
        search_during_disambiguation: bool,
    ) -> AppResult<Self> {
        config.validate()?;
        let mut disambiguation = DisambiguationAgent::new(client.clone());
        if search_during_disambiguation {
            disambiguation = disambiguation.with_search(SearchToolRunner::new(retrieval.clone()));
        }

        Ok(Self {
            knowledge_base: KnowledgeBase::new(),
            disambiguation: Arc::new(disambiguation),
            summarizer: Arc::new(SummarizerAgent::new(
                client.clone(),
                config.summarize_threshold_chars,
                config.max_summarize_chars,
            )),
            critic: Arc::new(CriticAgent::new(client.clone())),
            report_writer: Arc::new(ReportWriterAgent::new(client, config.report_paragraphs.clone())),
            retrieval,
            config,
        })
    }

    /// Live LLM and web retrieval from environment configuration.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let client: Arc<dyn InferenceClient> = Arc::new(LLM::from_config(&config.llm)?);
        let web = WebRetrieval::from_config(&config.search)?;
        let has_search = web.has_search();
        if !has_search {
            warn!("SERPAPI_KEY not set, searches will fail and reports cannot be sourced");
        }
        let research = config
            .research
            .clone()
            .covering_fetch_budget(config.search.fetch_budget());
        Self::new(client, Arc::new(web), research, has_search)
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub result: StructuredResult,
    pub new_history: ConversationHistory,
    /// States visited during the turn, starting with `AwaitingIntent`.
    pub trace: Vec<SessionState>,
}

struct Session {
    id: Uuid,
    state: SessionState,
    trace: Vec<SessionState>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::AwaitingIntent,
            trace: vec![SessionState::AwaitingIntent],
        }
    }

    fn advance(&mut self, next: SessionState) -> AppResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::Internal(format!(
                "illegal transition {} -> {}",
                self.state, next
            )));
        }
        info!(turn = %self.id, from = %self.state, to = %next, "State transition");
        self.state = next;
        self.trace.push(next);
        Ok(())
    }
}

enum Invocation<T> {
    Completed(T),
    /// Still invalid after the corrective re-prompt.
    Malformed(String),
}

/// Runs one agent under the retry rules. Only transport errors that outlive
/// the retry cap and contract violations (such as `NotFound`) escape.
async fn invoke_agent<I, O>(
    agent: &dyn SubAgent<Input = I, Output = O>,
    input: &I,
    kb: &mut KnowledgeBase,
    history: &ConversationHistory,
    config: &ResearchConfig,
) -> AppResult<Invocation<O>>
where
    I: Send + Sync,
    O: Send,
{
    let role = agent.role();
    let policy = RetryPolicy::new(config.inference_retries, config.backoff_base());
    let mut transport_failures = 0;
    let mut correction: Option<String> = None;

    loop {
        let ctx = AgentContext {
            knowledge_base: &mut *kb,
            history,
            correction: correction.as_deref(),
        };
        let result = match timeout(config.inference_timeout(), agent.invoke(input, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::InferenceTransport(format!("{} timed out", role))),
        };

        match result {
            Ok(output) => return Ok(Invocation::Completed(output)),
            Err(AppError::SchemaViolation(reason)) => {
                if correction.is_some() {
                    warn!(agent = %role, reason = %reason, "Output still invalid after correction");
                    return Ok(Invocation::Malformed(reason));
                }
                warn!(agent = %role, reason = %reason, "Output failed validation, re-prompting");
                correction = Some(reason);
            }
            Err(e) if e.is_transient() => {
                transport_failures += 1;
                if transport_failures >= policy.max_attempts {
                    warn!(agent = %role, attempts = transport_failures, error = %e, "Giving up on inference");
                    return Err(e);
                }
                let delay = policy.backoff_delay(transport_failures);
                warn!(
                    agent = %role,
                    attempt = transport_failures,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Inference failed, retrying"
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Summarizes every unsummarized document above the length threshold.
async fn summarize_pending(
    deps: &mut ResearchDeps,
    session: &mut Session,
    history: &ConversationHistory,
) -> AppResult<()> {
    let threshold = deps.config.summarize_threshold_chars;
    let pending: Vec<DocumentId> = deps
        .knowledge_base
        .list_documents(DocumentFilter::unsummarized())
        .filter(|d| char_len(&d.text) > threshold)
        .map(|d| d.id.clone())
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    session.advance(SessionState::Summarizing)?;
    for id in pending {
        let outcome = invoke_agent(
            deps.summarizer.as_ref(),
            &id,
            &mut deps.knowledge_base,
            history,
            &deps.config,
        )
        .await?;
        if let Invocation::Malformed(reason) = outcome {
            warn!(document = %id, reason = %reason, "Summary skipped, raw text will be used");
        }
    }
    Ok(())
}

fn issue_caveats(issues: &[CritiqueIssue]) -> Vec<String> {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.category, i.detail))
        .collect()
}

fn status(code: StatusCode, message: impl Into<String>, kb: &KnowledgeBase) -> StructuredResult {
    StructuredResult::IntermediateStatus(IntermediateStatus {
        code,
        message: message.into(),
        documents: kb.len(),
    })
}

/// Handles one user turn. `history` holds the earlier turns of this
/// conversation; the returned history is extended with this turn.
///
/// A clarifying question ends the turn without touching the knowledge base.
/// Otherwise the turn ends with a report, or with an intermediate status
/// when no report can be produced. Errors are transport failures that
/// outlived their retries, or contract violations inside the crate.
pub async fn run(
    user_message: &str,
    deps: &mut ResearchDeps,
    history: ConversationHistory,
) -> AppResult<RunOutcome> {
    let mut session = Session::new();
    info!(turn = %session.id, history = history.len(), documents = deps.knowledge_base.len(), "Starting turn");

    let result = drive(user_message, deps, &history, &mut session).await?;

    let new_history = history.extended([Turn::user(user_message), Turn::assistant(result.to_markdown())]);
    Ok(RunOutcome {
        result,
        new_history,
        trace: session.trace,
    })
}

async fn drive(
    user_message: &str,
    deps: &mut ResearchDeps,
    history: &ConversationHistory,
    session: &mut Session,
) -> AppResult<StructuredResult> {
    session.advance(SessionState::Clarifying)?;
    let message = user_message.to_string();
    let decision = invoke_agent(
        deps.disambiguation.as_ref(),
        &message,
        &mut deps.knowledge_base,
        history,
        &deps.config,
    )
    .await?;

    let plan = match decision {
        Invocation::Completed(Disambiguation::Clarify(question)) => {
            session.advance(SessionState::AwaitingIntent)?;
            return Ok(StructuredResult::ClarifyingQuestion(question));
        }
        Invocation::Completed(Disambiguation::Proceed(plan)) => plan,
        Invocation::Malformed(reason) => {
            warn!(reason = %reason, "Disambiguation unusable, researching the request as stated");
            SearchPlan {
                user_intent_short: message.clone(),
                user_intent_long: message.clone(),
                queries: vec![message.clone()],
            }
        }
    };

    session.advance(SessionState::Retrieving)?;
    let mut retrieval_log =
        retrieve(&plan.queries, deps.retrieval.as_ref(), &mut deps.knowledge_base, &deps.config).await;

    if deps.knowledge_base.len() < deps.config.min_documents_for_report {
        session.advance(SessionState::Done)?;
        return Ok(status(
            StatusCode::InsufficientSources,
            format!(
                "Found {} usable source(s) for \"{}\", which is not enough for a report. Try rephrasing the request or naming the company more precisely.",
                deps.knowledge_base.len(),
                plan.user_intent_short
            ),
            &deps.knowledge_base,
        ));
    }

    summarize_pending(deps, session, history).await?;

    let report = write_with_critique(&plan, deps, session, history, &mut retrieval_log).await?;
    let result = match report {
        Some(mut report) => {
            report.caveats.extend(retrieval_log.caveat());
            validate_report(&report, &deps.knowledge_base)?;
            StructuredResult::ResearchReport(report)
        }
        None => status(
            StatusCode::ReportUnavailable,
            "The report writer could not produce a valid report from the collected sources.",
            &deps.knowledge_base,
        ),
    };
    session.advance(SessionState::Done)?;
    Ok(result)
}

/// Writing and the bounded critique loop. `None` when no valid draft was
/// ever produced.
async fn write_with_critique(
    plan: &SearchPlan,
    deps: &mut ResearchDeps,
    session: &mut Session,
    history: &ConversationHistory,
    retrieval_log: &mut RetrievalReport,
) -> AppResult<Option<ResearchReport>> {
    let brief = format!("{}\n\n{}", plan.user_intent_short, plan.user_intent_long);
    let mut input = WriteInput {
        brief: brief.clone(),
        feedback: Vec::new(),
    };
    // fewest issues wins; later drafts win ties
    let mut best: Option<(ResearchReport, Vec<CritiqueIssue>)> = None;
    let mut rewrites = 0;

    loop {
        session.advance(SessionState::Writing)?;
        let written = invoke_agent(
            deps.report_writer.as_ref(),
            &input,
            &mut deps.knowledge_base,
            history,
            &deps.config,
        )
        .await?;

        let draft = match written {
            Invocation::Completed(draft) => draft,
            Invocation::Malformed(reason) => {
                warn!(reason = %reason, "Report draft unusable");
                return Ok(best.map(|(mut report, issues)| {
                    report.caveats.extend(issue_caveats(&issues));
                    report.caveats.push("A later revision of this report failed validation; this is the best earlier draft.".to_string());
                    report
                }));
            }
        };

        if !deps.config.critique_enabled {
            return Ok(Some(draft));
        }

        session.advance(SessionState::Critiquing)?;
        let critique_input = CritiqueInput {
            brief: brief.clone(),
            draft: draft.clone(),
        };
        let reviewed = invoke_agent(
            deps.critic.as_ref(),
            &critique_input,
            &mut deps.knowledge_base,
            history,
            &deps.config,
        )
        .await?;

        let critique = match reviewed {
            Invocation::Completed(critique) => critique,
            Invocation::Malformed(reason) => {
                warn!(reason = %reason, "Critique unusable, delivering draft unreviewed");
                let mut draft = draft;
                draft.caveats.push("This report could not be reviewed.".to_string());
                return Ok(Some(draft));
            }
        };

        if critique.approved {
            info!(rewrites, "Draft approved");
            return Ok(Some(draft));
        }

        let better = best
            .as_ref()
            .map_or(true, |(_, issues)| critique.issues.len() <= issues.len());
        if better {
            best = Some((draft, critique.issues.clone()));
        }

        if rewrites >= deps.config.max_critique_rounds {
            info!(rewrites, "Critique cap reached, delivering best draft with caveats");
            return Ok(best.map(|(mut report, issues)| {
                report.caveats.extend(issue_caveats(&issues));
                report
            }));
        }
        rewrites += 1;

        if !critique.recommended_queries.is_empty() {
            session.advance(SessionState::Retrieving)?;
            let extra = retrieve(
                &critique.recommended_queries,
                deps.retrieval.as_ref(),
                &mut deps.knowledge_base,
                &deps.config,
            )
            .await;
            retrieval_log.absorb(extra);
            summarize_pending(deps, session, history).await?;
        }
        input.feedback = critique.issues;
    }
}
