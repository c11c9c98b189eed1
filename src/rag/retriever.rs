use std::sync::Arc;
use std::time::Duration;

use super::reranker::Reranker;
use super::store::{RetrievalStrategy, RetrievedChunk, SearchMode, SearchRequest, VectorStore};
use crate::core::config::Settings;
use crate::core::errors::ServiceError;
use crate::core::retry::{retry_with_backoff, RetryPolicy};
use crate::llm::LlmService;

/// Embeds queries and dispatches them to the vector store by strategy.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    llm: LlmService,
    reranker: Option<Arc<dyn Reranker>>,
    fetch_k: usize,
    mmr_lambda: f32,
    retry: RetryPolicy,
    search_timeout: Duration,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        llm: LlmService,
        reranker: Option<Arc<dyn Reranker>>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            llm,
            reranker,
            fetch_k: settings.fetch_k(),
            mmr_lambda: settings.retrieval.mmr_lambda,
            retry: settings.retry_policy(),
            search_timeout: Duration::from_secs(settings.vector_database.timeout_seconds),
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        strategy: RetrievalStrategy,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ServiceError> {
        let k = k.max(1);
        let embedding = self.llm.embed_one(query).await?;

        let mode = match strategy {
            RetrievalStrategy::Similarity => SearchMode::Similarity,
            RetrievalStrategy::Mmr => SearchMode::Mmr {
                lambda: self.mmr_lambda,
                fetch_k: self.fetch_k,
            },
            RetrievalStrategy::Hybrid => SearchMode::Hybrid {
                fetch_k: self.fetch_k,
            },
            RetrievalStrategy::Rerank => {
                return self.retrieve_reranked(query, embedding, k).await;
            }
        };

        self.search(SearchRequest {
            embedding,
            query_text: query.to_string(),
            mode,
            k,
        })
        .await
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<RetrievedChunk>, ServiceError> {
        let operation = format!("{} search", self.store.name());
        let request = &request;
        retry_with_backoff(&self.retry, &operation, || async move {
            match tokio::time::timeout(self.search_timeout, self.store.search(request)).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::timeout(
                    self.store.name(),
                    self.search_timeout.as_secs(),
                )),
            }
        })
        .await
    }

    /// Similarity candidates reordered by the reranker. Without a reranker,
    /// or when it fails, the similarity order is kept.
    async fn retrieve_reranked(
        &self,
        query: &str,
        embedding: Vec<f32>,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ServiceError> {
        let Some(reranker) = &self.reranker else {
            tracing::warn!("Rerank strategy requested without a reranker; using similarity");
            return self
                .search(SearchRequest {
                    embedding,
                    query_text: query.to_string(),
                    mode: SearchMode::Similarity,
                    k,
                })
                .await;
        };

        let mut candidates = self
            .search(SearchRequest {
                embedding,
                query_text: query.to_string(),
                mode: SearchMode::Similarity,
                k: self.fetch_k.max(k),
            })
            .await?;

        let documents: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        match reranker.rerank(query, &documents, k).await {
            Ok(ranked) => Ok(ranked
                .into_iter()
                .take(k)
                .filter_map(|(idx, score)| {
                    candidates.get(idx).cloned().map(|mut chunk| {
                        chunk.score = score;
                        chunk
                    })
                })
                .collect()),
            Err(e) => {
                tracing::warn!(
                    "{} rerank failed, keeping similarity order: {}",
                    reranker.name(),
                    e
                );
                candidates.truncate(k);
                Ok(candidates)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatRequest, LlmModels, LlmProvider};
    use crate::rag::loader::DocumentChunk;
    use crate::rag::sqlite::SqliteVectorStore;
    use async_trait::async_trait;

    /// Embeds text onto two axes: "gift" and everything else.
    struct AxisEmbedder;

    #[async_trait]
    impl LlmProvider for AxisEmbedder {
        fn name(&self) -> &str {
            "axis"
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, ServiceError> {
            Ok(String::new())
        }

        async fn embed(
            &self,
            inputs: &[String],
            _model_id: &str,
        ) -> Result<Vec<Vec<f32>>, ServiceError> {
            Ok(inputs
                .iter()
                .map(|s| {
                    if s.to_lowercase().contains("gift") {
                        vec![1.0, 0.1]
                    } else {
                        vec![0.1, 1.0]
                    }
                })
                .collect())
        }
    }

    struct ReverseReranker {
        fail: bool,
    }

    #[async_trait]
    impl Reranker for ReverseReranker {
        fn name(&self) -> &str {
            "reverse"
        }

        async fn rerank(
            &self,
            _query: &str,
            documents: &[String],
            top_n: usize,
        ) -> Result<Vec<(usize, f32)>, ServiceError> {
            if self.fail {
                return Err(ServiceError::transport("reverse", "down"));
            }
            Ok((0..documents.len())
                .rev()
                .take(top_n)
                .enumerate()
                .map(|(rank, idx)| (idx, 1.0 - rank as f32 * 0.1))
                .collect())
        }
    }

    async fn retriever(reranker: Option<Arc<dyn Reranker>>) -> Retriever {
        let path = std::env::temp_dir().join(format!(
            "integribot-retriever-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        let store = SqliteVectorStore::with_path(path).await.unwrap();
        let chunk = |doc: &str, text: &str| DocumentChunk {
            id: crate::rag::loader::chunk_id(doc, 0),
            document_id: doc.to_string(),
            source_document: format!("{}.pdf", doc),
            chunk_index: 0,
            char_offset: 0,
            token_count: 4,
            text: text.to_string(),
        };
        store
            .upsert(&[
                (chunk("gifts", "Gift acceptance limits"), vec![1.0, 0.0]),
                (chunk("travel", "Travel reimbursement"), vec![0.0, 1.0]),
                (chunk("mixed", "Gifts during travel"), vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let mut settings = Settings::default();
        settings.workflow.retry_backoff_ms = 0;
        let llm = LlmService::new(
            Arc::new(AxisEmbedder),
            LlmModels::from_settings(&settings),
            Duration::from_secs(5),
            RetryPolicy::new(0, Duration::ZERO),
        );
        Retriever::new(Arc::new(store), llm, reranker, &settings)
    }

    #[tokio::test]
    async fn similarity_returns_closest_chunks() {
        let retriever = retriever(None).await;
        let chunks = retriever
            .retrieve("Can I accept a gift?", RetrievalStrategy::Similarity, 2)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source, "gifts.pdf");
        assert_eq!(chunks[1].source, "mixed.pdf");
    }

    #[tokio::test]
    async fn rerank_reorders_candidates() {
        let retriever = retriever(Some(Arc::new(ReverseReranker { fail: false }))).await;
        let chunks = retriever
            .retrieve("gift", RetrievalStrategy::Rerank, 2)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source, "travel.pdf");
        assert!((chunks[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn rerank_failure_keeps_similarity_order() {
        let retriever = retriever(Some(Arc::new(ReverseReranker { fail: true }))).await;
        let chunks = retriever
            .retrieve("gift", RetrievalStrategy::Rerank, 2)
            .await
            .unwrap();
        assert_eq!(chunks[0].source, "gifts.pdf");
        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test]
    async fn rerank_without_reranker_falls_back() {
        let retriever = retriever(None).await;
        let chunks = retriever
            .retrieve("gift", RetrievalStrategy::Rerank, 1)
            .await
            .unwrap();
        assert_eq!(chunks[0].source, "gifts.pdf");
    }
}
