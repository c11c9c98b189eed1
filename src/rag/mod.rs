pub mod documents;
pub mod loader;
pub mod qdrant;
pub mod reranker;
pub mod retriever;
pub mod sqlite;
pub mod store;
pub mod tokenizer;

use std::sync::Arc;

pub use documents::{DocumentError, DocumentRegistry, DocumentService, IndexReport};
pub use loader::{Chunker, DocumentChunk};
pub use qdrant::QdrantStore;
pub use reranker::{CohereReranker, Reranker};
pub use retriever::Retriever;
pub use sqlite::SqliteVectorStore;
pub use store::{RetrievalStrategy, RetrievedChunk, SearchMode, SearchRequest, VectorStore};
pub use tokenizer::{token_counter, TokenCounter};

use crate::core::config::{AppPaths, Settings};
use crate::core::errors::ServiceError;

/// The vector store selected by `vector_database.backend`.
pub async fn build_vector_store(
    settings: &Settings,
    paths: &AppPaths,
) -> Result<Arc<dyn VectorStore>, ServiceError> {
    match settings.vector_database.backend.as_str() {
        "sqlite" => {
            let store = SqliteVectorStore::with_path(paths.db_path.clone()).await?;
            Ok(Arc::new(store))
        }
        _ => Ok(Arc::new(QdrantStore::new(&settings.vector_database)?)),
    }
}
