// Company Research - multi-agent research assistant with cited reports

pub mod config;
pub mod types;
pub mod models;
pub mod knowledge_base;
pub mod contract;  // Structured agent outputs, schemas and report citations
pub mod agents;
pub mod llm;
pub mod search;    // Web search (SerpAPI Google Light) and page fetching
pub mod orchestrator;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use contract::{ResearchReport, StructuredResult};
pub use knowledge_base::KnowledgeBase;
pub use models::ConversationHistory;
pub use orchestrator::{run, ResearchDeps, RunOutcome};
pub use types::{AppError, AppResult};
