// OpenAI-compatible chat completions adapter
// Serves OpenAI, Groq, OpenRouter and GLM, which all expose /chat/completions
// with the same request and tool-calling format.

use crate::llm::provider::InferenceClient;
use crate::llm::tools::ToolRunner;
use crate::types::{AppError, AppResult, CompletionRequest, LLMProvider, LLMResponse, TokenUsage};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
// General API endpoint; the coding endpoint needs a separate subscription
const GLM_API_BASE: &str = "https://api.z.ai/api/paas/v4";

pub struct OpenAiCompatibleAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tool_rounds: u32,
}

// Request types
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn tool_result(call_id: &str, content: String) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
        }
    }
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunctionSpec,
}

#[derive(Serialize)]
struct WireFunctionSpec {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded arguments, as the API sends them.
    arguments: String,
}

// Response types
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiCompatibleAdapter {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: OPENAI_API_BASE.to_string(),
            model: model.to_string(),
            max_tool_rounds: 4,
        }
    }

    pub fn for_provider(provider: LLMProvider, api_key: &str, model: &str) -> AppResult<Self> {
        let base = match provider {
            LLMProvider::OpenAI => OPENAI_API_BASE,
            LLMProvider::Groq => GROQ_API_BASE,
            LLMProvider::OpenRouter => OPENROUTER_API_BASE,
            LLMProvider::GLM => GLM_API_BASE,
        };
        Ok(Self::new(api_key, model).with_base_url(base))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> AppResult<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn system_prompt(request: &CompletionRequest) -> String {
        match &request.output_schema {
            Some(schema) => format!(
                "{}\n\nRespond with ONLY a JSON object that validates against this JSON schema:\n{}",
                request.system_prompt, schema
            ),
            None => request.system_prompt.clone(),
        }
    }

    async fn send(&self, body: &ChatRequest<'_>) -> AppResult<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::InferenceTransport(format!("Request to {} failed: {}", self.base_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|r| r.error.message)
                .unwrap_or(error_text);
            return Err(classify_status(status, &message));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::InferenceTransport(format!("Failed to parse completion response: {}", e)))
    }
}

fn classify_status(status: StatusCode, message: &str) -> AppError {
    let detail = format!("API error ({}): {}", status, message);
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => AppError::InferenceTransport(detail),
        s if s.is_server_error() => AppError::InferenceTransport(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => AppError::Config(detail),
        _ => AppError::Internal(detail),
    }
}

#[async_trait]
impl InferenceClient for OpenAiCompatibleAdapter {
    async fn complete(
        &self,
        request: &CompletionRequest,
        tools: Option<&dyn ToolRunner>,
    ) -> AppResult<LLMResponse> {
        let mut messages = vec![WireMessage::text("system", &Self::system_prompt(request))];
        messages.extend(request.messages.iter().map(|m| WireMessage::text(&m.role, &m.content)));

        let runner = tools.filter(|_| !request.tools.is_empty());
        let mut usage = TokenUsage::default();

        for round in 0..=self.max_tool_rounds {
            // the last round withholds tools so the model has to answer
            let offer_tools = runner.is_some() && round < self.max_tool_rounds;
            let body = ChatRequest {
                model: &self.model,
                messages: &messages,
                max_tokens: request.max_tokens,
                temperature: request.temperature,
                tools: offer_tools.then(|| {
                    request
                        .tools
                        .iter()
                        .map(|t| WireTool {
                            tool_type: "function",
                            function: WireFunctionSpec {
                                name: t.name.clone(),
                                description: t.description.clone(),
                                parameters: t.parameters.clone(),
                            },
                        })
                        .collect()
                }),
                response_format: request
                    .output_schema
                    .as_ref()
                    .map(|_| ResponseFormat { format_type: "json_object" }),
            };

            let response = self.send(&body).await?;
            if let Some(u) = &response.usage {
                usage.prompt_tokens += u.prompt_tokens;
                usage.completion_tokens += u.completion_tokens;
                usage.total_tokens += u.total_tokens;
            }

            let choice = response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| AppError::InferenceTransport("Completion returned no choices".to_string()))?;

            let calls = choice.message.tool_calls.clone().unwrap_or_default();
            if let (Some(runner), false, true) = (runner, calls.is_empty(), offer_tools) {
                debug!(round, calls = calls.len(), "Model requested tool calls");
                messages.push(choice.message);
                for call in &calls {
                    let output = match serde_json::from_str(&call.function.arguments) {
                        Ok(args) => runner.run(&call.function.name, &args).await,
                        Err(e) => Err(AppError::SchemaViolation(format!("tool arguments are not JSON: {}", e))),
                    };
                    let content = output.unwrap_or_else(|e| {
                        warn!(tool = %call.function.name, error = %e, "Tool call failed");
                        format!("Tool error: {}", e)
                    });
                    messages.push(WireMessage::tool_result(&call.id, content));
                }
                continue;
            }

            let content = choice.message.content.unwrap_or_default();
            if content.trim().is_empty() {
                return Err(AppError::SchemaViolation("Model returned an empty completion".to_string()));
            }

            info!(
                model = %self.model,
                rounds = round + 1,
                total_tokens = usage.total_tokens,
                "Completion received"
            );
            return Ok(LLMResponse {
                content,
                finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
                usage,
            });
        }

        Err(AppError::Internal("Tool loop ended without a completion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LLMMessage, ToolSpec};
    use mockito::Matcher;
    use serde_json::{json, Value};

    fn adapter(server: &mockito::Server) -> OpenAiCompatibleAdapter {
        OpenAiCompatibleAdapter::new("test-key", "gpt-4o-mini").with_base_url(&server.url())
    }

    fn completion(content: &str) -> String {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
        .to_string()
    }

    struct Echo;

    #[async_trait]
    impl ToolRunner for Echo {
        fn specs(&self) -> Vec<ToolSpec> {
            vec![ToolSpec {
                name: "web_search".to_string(),
                description: "search".to_string(),
                parameters: json!({"type": "object"}),
            }]
        }

        async fn run(&self, _name: &str, arguments: &Value) -> AppResult<String> {
            Ok(format!("results for {}", arguments["query"]))
        }
    }

    #[test]
    fn test_provider_endpoints() {
        let groq = OpenAiCompatibleAdapter::for_provider(LLMProvider::Groq, "k", "m").unwrap();
        assert_eq!(groq.base_url(), GROQ_API_BASE);
        let glm = OpenAiCompatibleAdapter::for_provider(LLMProvider::GLM, "k", "m").unwrap();
        assert_eq!(glm.base_url(), "https://api.z.ai/api/paas/v4");
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down").is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(matches!(classify_status(StatusCode::UNAUTHORIZED, ""), AppError::Config(_)));
        assert!(matches!(classify_status(StatusCode::BAD_REQUEST, ""), AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_complete_with_schema() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::Regex("json_object".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion(r#"{"kind": "summary", "text": "ok"}"#))
            .create_async()
            .await;

        let request = CompletionRequest::new("Summarize.", vec![LLMMessage::user("text")])
            .with_output_schema(json!({"type": "object"}));
        let response = adapter(&server).complete(&request, None).await.unwrap();

        assert_eq!(response.content, r#"{"kind": "summary", "text": "ok"}"#);
        assert_eq!(response.usage.total_tokens, 15);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": {"message": "Rate limit reached"}}"#)
            .create_async()
            .await;

        let request = CompletionRequest::new("s", vec![LLMMessage::user("u")]);
        let err = adapter(&server).complete(&request, None).await.unwrap_err();
        assert!(matches!(err, AppError::InferenceTransport(ref m) if m.contains("Rate limit reached")));
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex(r#""tools":"#.to_string()))
            .with_status(200)
            .with_body(
                json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": null,
                            "tool_calls": [{
                                "id": "call_1",
                                "type": "function",
                                "function": {"name": "web_search", "arguments": "{\"query\": \"Thomson Reuters\"}"}
                            }]
                        },
                        "finish_reason": "tool_calls"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex(r#""tool_call_id":"call_1""#.to_string()))
            .with_status(200)
            .with_body(completion("done"))
            .create_async()
            .await;

        let runner = Echo;
        let request = CompletionRequest::new("s", vec![LLMMessage::user("Thomson Reuters")])
            .with_tools(runner.specs());
        let response = adapter(&server)
            .with_max_tool_rounds(1)
            .complete(&request, Some(&runner))
            .await
            .unwrap();

        assert_eq!(response.content, "done");
        first.assert_async().await;
        second.assert_async().await;
    }
}
