use crate::config::LLMConfig;
use crate::llm::openai::OpenAiCompatibleAdapter;
use crate::llm::tools::ToolRunner;
use crate::types::{AppError, AppResult, CompletionRequest, LLMProvider, LLMResponse};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// `complete(system_prompt, messages, tool_specs, output_schema)`.
///
/// Implementations run any tool calls the model makes through `tools`
/// before returning the final text. Transport trouble (timeouts, rate
/// limits, 5xx) is reported as [`AppError::InferenceTransport`] so the
/// caller can decide whether to retry.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
        tools: Option<&dyn ToolRunner>,
    ) -> AppResult<LLMResponse>;
}

pub struct LLM {
    adapter: Box<dyn InferenceClient>,
    provider: LLMProvider,
    model: String,
}

impl LLM {
    pub fn from_config(config: &LLMConfig) -> AppResult<Self> {
        let provider = LLMProvider::from_id(&config.provider)
            .ok_or_else(|| AppError::Config(format!("Unsupported provider: {}", config.provider)))?;

        if config.api_key.is_empty() {
            return Err(AppError::Config(format!(
                "No API key configured for provider {}",
                provider
            )));
        }

        let mut adapter = OpenAiCompatibleAdapter::for_provider(provider, &config.api_key, &config.model)?
            .with_timeout(Duration::from_secs(config.timeout_secs))?
            .with_max_tool_rounds(config.max_tool_rounds);
        if let Some(base) = &config.api_base {
            adapter = adapter.with_base_url(base);
        }

        info!(provider = %provider, model = %config.model, "LLM client configured");
        Ok(Self {
            adapter: Box::new(adapter),
            provider,
            model: config.model.clone(),
        })
    }

    pub fn provider(&self) -> LLMProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl InferenceClient for LLM {
    async fn complete(
        &self,
        request: &CompletionRequest,
        tools: Option<&dyn ToolRunner>,
    ) -> AppResult<LLMResponse> {
        self.adapter.complete(request, tools).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, key: &str) -> LLMConfig {
        LLMConfig {
            provider: provider.to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: key.to_string(),
            api_base: None,
            timeout_secs: 30,
            max_tool_rounds: 2,
        }
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        assert!(matches!(
            LLM::from_config(&config("anthropic", "k")),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        assert!(matches!(LLM::from_config(&config("openai", "")), Err(AppError::Config(_))));
    }

    #[test]
    fn test_known_provider() {
        let llm = LLM::from_config(&config("groq", "k")).unwrap();
        assert_eq!(llm.provider(), LLMProvider::Groq);
        assert_eq!(llm.model(), "gpt-4o-mini");
    }
}
