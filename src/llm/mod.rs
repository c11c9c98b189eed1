pub mod openai;
pub mod provider;
pub mod service;
pub mod types;

pub use openai::OpenAiProvider;
pub use provider::LlmProvider;
pub use service::{LlmModels, LlmService};
pub use types::{ChatMessage, ChatRequest};
