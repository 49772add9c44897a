// LLM abstraction layer

pub mod openai;
pub mod provider;
pub mod tools;

pub use openai::OpenAiCompatibleAdapter;
pub use provider::{InferenceClient, LLM};
pub use tools::{SearchToolRunner, ToolRunner};
