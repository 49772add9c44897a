use crate::search::WebFetcher;
use crate::types::{AppError, AppResult};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LLMConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone)]
pub struct LLMConfig {
    pub provider: String,
    pub model: String,
    pub api_key: String,
    /// Overrides the provider's default endpoint.
    pub api_base: Option<String>,
    pub timeout_secs: u64,
    pub max_tool_rounds: u32,
}

impl std::fmt::Debug for LLMConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LLMConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish()
    }
}

#[derive(Clone)]
pub struct SearchConfig {
    pub serpapi_key: String,
    pub max_results: usize,
    pub requests_per_second: u32,
    pub fetch_retries: u32,
    pub fetch_timeout_secs: u64,
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("serpapi_key", &if self.serpapi_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("max_results", &self.max_results)
            .field("requests_per_second", &self.requests_per_second)
            .field("fetch_retries", &self.fetch_retries)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .finish()
    }
}

impl SearchConfig {
    /// Worst-case wall time of one fetch: every attempt timing out plus the
    /// backoff between them.
    pub fn fetch_budget(&self) -> Duration {
        let attempts = Duration::from_secs(self.fetch_timeout_secs).saturating_mul(self.fetch_retries + 1);
        attempts + WebFetcher::retry_policy(self.fetch_retries).max_total_backoff()
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "company_research=info".to_string(),
            log_dir: None,
        }
    }
}

/// Orchestration parameters. Every field has a default so partial files load.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Rewrites allowed after the first critique. Zero means critique once, never rewrite.
    pub max_critique_rounds: u32,
    pub critique_enabled: bool,
    /// Documents longer than this get a summary; the head is kept verbatim.
    pub summarize_threshold_chars: usize,
    /// Text beyond this is never sent to the summarizer.
    pub max_summarize_chars: usize,
    pub max_queries: usize,
    pub fetch_per_query: usize,
    pub retrieval_concurrency: usize,
    pub min_documents_for_report: usize,
    /// Total attempts for a transport failure, including the first.
    pub inference_retries: u32,
    pub backoff_base_ms: u64,
    pub retrieval_timeout_secs: u64,
    pub inference_timeout_secs: u64,
    pub report_paragraphs: String,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_critique_rounds: 2,
            critique_enabled: true,
            // ~6 pages of 500 words at 6.7 chars per word
            summarize_threshold_chars: 20_100,
            // ~50 pages
            max_summarize_chars: 167_500,
            max_queries: 5,
            fetch_per_query: 2,
            retrieval_concurrency: 4,
            min_documents_for_report: 1,
            inference_retries: 3,
            backoff_base_ms: 500,
            retrieval_timeout_secs: 30,
            inference_timeout_secs: 90,
            report_paragraphs: "three-to-five".to_string(),
        }
    }
}

impl ResearchConfig {
    /// Loads from a TOML, JSON or YAML file; the format follows the extension.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let research: Self = settings
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("Invalid research config {}: {}", path.display(), e)))?;
        research.validate()?;
        Ok(research)
    }

    pub fn validate(&self) -> AppResult<()> {
        let positive = [
            ("max_queries", self.max_queries as u64),
            ("fetch_per_query", self.fetch_per_query as u64),
            ("retrieval_concurrency", self.retrieval_concurrency as u64),
            ("inference_retries", self.inference_retries as u64),
            ("retrieval_timeout_secs", self.retrieval_timeout_secs),
            ("inference_timeout_secs", self.inference_timeout_secs),
            ("summarize_threshold_chars", self.summarize_threshold_chars as u64),
            ("min_documents_for_report", self.min_documents_for_report as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be at least 1", name)));
            }
        }
        if self.max_summarize_chars < self.summarize_threshold_chars {
            return Err(AppError::Config(
                "max_summarize_chars must not be below summarize_threshold_chars".to_string(),
            ));
        }
        Ok(())
    }

    /// Raises the per-call retrieval timeout so it never cuts a fetch's own
    /// retries short.
    pub fn covering_fetch_budget(mut self, budget: Duration) -> Self {
        if self.retrieval_timeout() < budget {
            let secs = budget.as_secs() + u64::from(budget.subsec_nanos() > 0);
            info!(
                configured_secs = self.retrieval_timeout_secs,
                raised_secs = secs,
                "Raising retrieval timeout to cover fetch retries"
            );
            self.retrieval_timeout_secs = secs;
        }
        self
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

fn var_or<T: FromStr>(key: &str, default: T) -> AppResult<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{} is invalid: {}", key, e))),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        let research = ResearchConfig::default();
        research.validate()?;

        Ok(Self {
            llm: LLMConfig {
                provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string()),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                api_key: env::var("LLM_API_KEY")
                    .or_else(|_| env::var("OPENAI_API_KEY"))
                    .unwrap_or_default(),
                api_base: env::var("LLM_API_BASE").ok().filter(|s| !s.trim().is_empty()),
                timeout_secs: var_or("LLM_TIMEOUT_SECS", 60)?,
                max_tool_rounds: var_or("LLM_MAX_TOOL_ROUNDS", 4)?,
            },
            search: SearchConfig {
                serpapi_key: env::var("SERPAPI_KEY").unwrap_or_default(),
                max_results: var_or("SEARCH_MAX_RESULTS", 10)?,
                requests_per_second: var_or("SEARCH_REQUESTS_PER_SECOND", 2)?,
                fetch_retries: var_or("FETCH_RETRIES", 2)?,
                fetch_timeout_secs: var_or("FETCH_TIMEOUT_SECS", 20)?,
            },
            research,
            logging: LoggingConfig {
                filter: env::var("LOG_FILTER").unwrap_or_else(|_| LoggingConfig::default().filter),
                log_dir: env::var("LOG_DIR").ok().filter(|s| !s.trim().is_empty()).map(PathBuf::from),
            },
        })
    }
}
