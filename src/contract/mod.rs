//! Structured Output Contract
//!
//! Closed set of shapes an agent response may take. Every raw response is
//! parsed into [`AgentOutput`], checked against the kinds the caller accepts
//! and validated before anything downstream sees it. A response that fails
//! any of these steps is a [`AppError::SchemaViolation`], never coerced.

pub mod report;

pub use report::{resolve_draft, validate_report, ResearchReport};

use crate::types::{AppError, AppResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ClarifyingQuestion {
    /// Question shown to the user; the turn ends here.
    #[validate(length(min = 1))]
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SearchPlan {
    /// One-line statement of what the user wants.
    #[validate(length(min = 1))]
    pub user_intent_short: String,
    /// Full brief handed to the report writer.
    #[validate(length(min = 1))]
    pub user_intent_long: String,
    #[validate(length(min = 1), custom(function = "no_blank_items"))]
    pub queries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct Summary {
    #[validate(length(min = 1))]
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    WeakSourcing,
    UnsupportedClaim,
    MissingCoverage,
    Other,
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueCategory::WeakSourcing => write!(f, "weak sourcing"),
            IssueCategory::UnsupportedClaim => write!(f, "unsupported claim"),
            IssueCategory::MissingCoverage => write!(f, "missing coverage"),
            IssueCategory::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct CritiqueIssue {
    pub category: IssueCategory,
    #[validate(length(min = 1))]
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[validate(schema(function = "rejection_needs_issues"))]
pub struct Critique {
    pub approved: bool,
    #[serde(default)]
    #[validate(nested)]
    pub issues: Vec<CritiqueIssue>,
    /// Extra searches that would close the gaps the critic found.
    #[serde(default)]
    #[validate(custom(function = "no_blank_items"))]
    pub recommended_queries: Vec<String>,
}

impl Critique {
    pub fn approval() -> Self {
        Self {
            approved: true,
            issues: Vec::new(),
            recommended_queries: Vec::new(),
        }
    }
}

/// A citation as the writer emits it, keyed by the source label it was shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct DraftCitation {
    #[validate(length(min = 1))]
    pub source: String,
    #[serde(default)]
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ReportDraft {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub body: String,
    #[serde(default)]
    #[validate(nested)]
    pub citations: Vec<DraftCitation>,
}

/// Raw agent response, discriminated by its `kind` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentOutput {
    ClarifyingQuestion(ClarifyingQuestion),
    SearchPlan(SearchPlan),
    Summary(Summary),
    Critique(Critique),
    ReportDraft(ReportDraft),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    ClarifyingQuestion,
    SearchPlan,
    Summary,
    Critique,
    ReportDraft,
}

impl OutputKind {
    pub fn tag(&self) -> &'static str {
        match self {
            OutputKind::ClarifyingQuestion => "clarifying_question",
            OutputKind::SearchPlan => "search_plan",
            OutputKind::Summary => "summary",
            OutputKind::Critique => "critique",
            OutputKind::ReportDraft => "report_draft",
        }
    }

    fn payload_schema(&self) -> AppResult<Value> {
        let schema = match self {
            OutputKind::ClarifyingQuestion => schemars::schema_for!(ClarifyingQuestion),
            OutputKind::SearchPlan => schemars::schema_for!(SearchPlan),
            OutputKind::Summary => schemars::schema_for!(Summary),
            OutputKind::Critique => schemars::schema_for!(Critique),
            OutputKind::ReportDraft => schemars::schema_for!(ReportDraft),
        };
        serde_json::to_value(&schema)
            .map_err(|e| AppError::Internal(format!("Failed to serialize output schema: {}", e)))
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl AgentOutput {
    pub fn kind(&self) -> OutputKind {
        match self {
            AgentOutput::ClarifyingQuestion(_) => OutputKind::ClarifyingQuestion,
            AgentOutput::SearchPlan(_) => OutputKind::SearchPlan,
            AgentOutput::Summary(_) => OutputKind::Summary,
            AgentOutput::Critique(_) => OutputKind::Critique,
            AgentOutput::ReportDraft(_) => OutputKind::ReportDraft,
        }
    }

    fn validate_payload(&self) -> AppResult<()> {
        let result = match self {
            AgentOutput::ClarifyingQuestion(q) => q.validate(),
            AgentOutput::SearchPlan(p) => p.validate(),
            AgentOutput::Summary(s) => s.validate(),
            AgentOutput::Critique(c) => c.validate(),
            AgentOutput::ReportDraft(d) => d.validate(),
        };
        result.map_err(|e| AppError::SchemaViolation(format!("{} failed validation: {}", self.kind(), e)))
    }
}

/// Status codes for turns that end without a report or question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    InsufficientSources,
    ReportUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateStatus {
    pub code: StatusCode,
    pub message: String,
    /// Documents in the knowledge base when the turn ended.
    pub documents: usize,
}

/// What a turn hands back to the host. Exactly one variant per turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuredResult {
    ClarifyingQuestion(ClarifyingQuestion),
    ResearchReport(ResearchReport),
    IntermediateStatus(IntermediateStatus),
}

impl StructuredResult {
    /// Markdown rendering for terminals and chat transcripts.
    pub fn to_markdown(&self) -> String {
        match self {
            StructuredResult::ClarifyingQuestion(q) => q.question.clone(),
            StructuredResult::ResearchReport(r) => r.to_markdown(),
            StructuredResult::IntermediateStatus(s) => s.message.clone(),
        }
    }
}

fn no_blank_items(items: &Vec<String>) -> Result<(), ValidationError> {
    if items.iter().any(|q| q.trim().is_empty()) {
        return Err(ValidationError::new("blank_item"));
    }
    Ok(())
}

fn rejection_needs_issues(critique: &Critique) -> Result<(), ValidationError> {
    if !critique.approved && critique.issues.is_empty() {
        return Err(ValidationError::new("rejection_without_issues"));
    }
    Ok(())
}

/// Strip markdown code fences around a JSON payload.
pub fn extract_json(response: &str) -> &str {
    if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(response)
            .trim()
    } else if response.contains("```") {
        response.split("```").nth(1).unwrap_or(response).trim()
    } else {
        response.trim()
    }
}

/// Parse, kind-check and validate one raw agent response.
pub fn parse_output(raw: &str, allowed: &[OutputKind]) -> AppResult<AgentOutput> {
    let json_str = extract_json(raw);
    if json_str.is_empty() {
        return Err(AppError::SchemaViolation("empty response".to_string()));
    }

    let output: AgentOutput = serde_json::from_str(json_str)
        .map_err(|e| AppError::SchemaViolation(format!("response is not a known output shape: {}", e)))?;

    if !allowed.contains(&output.kind()) {
        let expected: Vec<&str> = allowed.iter().map(|k| k.tag()).collect();
        return Err(AppError::SchemaViolation(format!(
            "unexpected kind '{}', expected one of [{}]",
            output.kind(),
            expected.join(", ")
        )));
    }

    output.validate_payload()?;
    Ok(output)
}

/// JSON schema for a response restricted to `kinds`; sent with every request.
pub fn output_schema(kinds: &[OutputKind]) -> AppResult<Value> {
    let variants = kinds
        .iter()
        .map(|kind| {
            let payload = kind.payload_schema()?;
            Ok(json!({
                "allOf": [
                    { "type": "object", "properties": { "kind": { "const": kind.tag() } }, "required": ["kind"] },
                    payload
                ]
            }))
        })
        .collect::<AppResult<Vec<Value>>>()?;

    Ok(json!({ "oneOf": variants }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clarifying_question() {
        let raw = r#"{"kind": "clarifying_question", "question": "Which aspect of Thomson Reuters?"}"#;
        let output = parse_output(raw, &[OutputKind::ClarifyingQuestion, OutputKind::SearchPlan]).unwrap();
        assert_eq!(output.kind(), OutputKind::ClarifyingQuestion);
    }

    #[test]
    fn test_parse_fenced_search_plan() {
        let raw = "Here you go:\n```json\n{\"kind\": \"search_plan\", \"user_intent_short\": \"Acme revenue\", \"user_intent_long\": \"Acme Corp revenue growth 2020-2024\", \"queries\": [\"acme revenue 2024\"]}\n```";
        let output = parse_output(raw, &[OutputKind::SearchPlan]).unwrap();
        match output {
            AgentOutput::SearchPlan(plan) => assert_eq!(plan.queries.len(), 1),
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_is_schema_violation() {
        let err = parse_output(r#"{"kind": "poem", "text": "x"}"#, &[OutputKind::Summary]).unwrap_err();
        assert!(matches!(err, AppError::SchemaViolation(_)));
    }

    #[test]
    fn test_disallowed_kind_is_schema_violation() {
        let err = parse_output(r#"{"kind": "summary", "text": "x"}"#, &[OutputKind::Critique]).unwrap_err();
        assert!(matches!(err, AppError::SchemaViolation(ref m) if m.contains("unexpected kind")));
    }

    #[test]
    fn test_empty_queries_rejected() {
        let raw = r#"{"kind": "search_plan", "user_intent_short": "a", "user_intent_long": "b", "queries": []}"#;
        assert!(parse_output(raw, &[OutputKind::SearchPlan]).is_err());

        let raw = r#"{"kind": "search_plan", "user_intent_short": "a", "user_intent_long": "b", "queries": ["ok", "  "]}"#;
        assert!(parse_output(raw, &[OutputKind::SearchPlan]).is_err());
    }

    #[test]
    fn test_rejection_requires_issues() {
        let raw = r#"{"kind": "critique", "approved": false, "issues": []}"#;
        assert!(parse_output(raw, &[OutputKind::Critique]).is_err());

        let raw = r#"{"kind": "critique", "approved": false, "issues": [{"category": "weak_sourcing", "detail": "one blog post"}]}"#;
        assert!(parse_output(raw, &[OutputKind::Critique]).is_ok());

        let raw = r#"{"kind": "critique", "approved": true}"#;
        assert!(parse_output(raw, &[OutputKind::Critique]).is_ok());
    }

    #[test]
    fn test_empty_report_body_rejected() {
        let raw = r#"{"kind": "report_draft", "title": "T", "body": "", "citations": []}"#;
        assert!(matches!(
            parse_output(raw, &[OutputKind::ReportDraft]),
            Err(AppError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_output_schema_lists_each_kind() {
        let schema = output_schema(&[OutputKind::ClarifyingQuestion, OutputKind::SearchPlan]).unwrap();
        let variants = schema["oneOf"].as_array().unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[1]["allOf"][0]["properties"]["kind"]["const"], "search_plan");
    }

    #[test]
    fn test_structured_result_is_tagged() {
        let result = StructuredResult::ClarifyingQuestion(ClarifyingQuestion {
            question: "Which market?".to_string(),
        });
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "clarifying_question");
        assert_eq!(result.to_markdown(), "Which market?");
    }
}
