use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to initialize LLM service: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("Failed to initialize vector store: {0}")]
    VectorStore(#[source] anyhow::Error),

    #[error("Failed to initialize web search: {0}")]
    WebSearch(#[source] anyhow::Error),

    #[error("Failed to initialize reranker: {0}")]
    Reranker(#[source] anyhow::Error),

    #[error("Failed to initialize document registry: {0}")]
    Documents(#[source] anyhow::Error),

    #[error("Failed to build consultation graph: {0}")]
    Graph(#[source] anyhow::Error),
}
