//! IntegriBot backend: a federal ethics consultation service combining a
//! vector-searched knowledge base, live web search and an LLM assessment.

pub mod core;
pub mod graph;
pub mod llm;
pub mod models;
pub mod rag;
pub mod server;
pub mod state;
pub mod tools;
