use std::path::PathBuf;
use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::graph::{EthicsWorkflow, WorkflowServices};
use crate::llm::{LlmService, OpenAiProvider};
use crate::rag::{
    build_vector_store, token_counter, Chunker, CohereReranker, DocumentRegistry, DocumentService,
    Reranker, Retriever, VectorStore,
};
use crate::tools::search::{TavilySearch, WebSearchProvider};

pub mod error;

use error::InitializationError;

/// Global application state shared across all routes and background tasks.
///
/// Contains references to:
/// - Configuration and paths
/// - External collaborators (LLM, vector store, web search, reranker)
/// - Document management
/// - The consultation workflow
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<Settings>,
    pub llm: LlmService,
    pub store: Arc<dyn VectorStore>,
    pub retriever: Retriever,
    pub search: Arc<dyn WebSearchProvider>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub documents: Arc<DocumentService>,
    pub workflow: EthicsWorkflow,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Resolving paths and loading validated settings
    /// 2. Building the LLM, web search and reranker clients
    /// 3. Opening the vector store and the document registry
    /// 4. Building the consultation graph
    pub async fn initialize(
        paths: Arc<AppPaths>,
        settings: Settings,
    ) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());

        let provider = OpenAiProvider::new(&settings.openai)
            .map_err(|e| InitializationError::Llm(e.into()))?;
        let llm = LlmService::from_settings(Arc::new(provider), &settings);

        let search: Arc<dyn WebSearchProvider> = Arc::new(
            TavilySearch::new(&settings.web_search)
                .map_err(|e| InitializationError::WebSearch(e.into()))?,
        );

        let reranker = CohereReranker::from_settings(&settings.reranker)
            .map_err(|e| InitializationError::Reranker(e.into()))?
            .map(|r| Arc::new(r) as Arc<dyn Reranker>);
        if reranker.is_none() {
            tracing::warn!("No reranker API key configured; rerank retrieval falls back to similarity");
        }

        let store = build_vector_store(&settings, &paths)
            .await
            .map_err(|e| InitializationError::VectorStore(e.into()))?;
        if let Err(e) = store.ensure_collection().await {
            tracing::warn!("Vector store not ready at startup: {}", e);
        }

        let registry = DocumentRegistry::with_path(&paths.db_path)
            .await
            .map_err(|e| InitializationError::Documents(e.into()))?;

        Self::from_parts(paths, config, settings, llm, store, search, reranker, registry)
    }

    /// Assembles state from already-built collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: Settings,
        llm: LlmService,
        store: Arc<dyn VectorStore>,
        search: Arc<dyn WebSearchProvider>,
        reranker: Option<Arc<dyn Reranker>>,
        registry: DocumentRegistry,
    ) -> Result<Arc<Self>, InitializationError> {
        let retriever = Retriever::new(store.clone(), llm.clone(), reranker.clone(), &settings);

        let processing = &settings.data_processing;
        let chunker = Chunker::new(
            processing.chunk_size,
            processing.chunk_overlap,
            token_counter(processing.tokenizer_path.as_deref()),
        );
        let documents = Arc::new(DocumentService::new(
            registry,
            store.clone(),
            llm.clone(),
            chunker,
            paths.upload_dir.clone(),
            processing.max_upload_bytes,
            processing.embedding_batch_size,
        ));

        let services =
            WorkflowServices::new(llm.clone(), retriever.clone(), search.clone(), &settings);
        let workflow = EthicsWorkflow::new(services, &settings)
            .map_err(|e| InitializationError::Graph(e.into()))?;

        Ok(Arc::new(AppState {
            paths,
            config,
            settings: Arc::new(settings),
            llm,
            store,
            retriever,
            search,
            reranker,
            documents,
            workflow,
        }))
    }

    /// Directory scanned for the federal ethics corpus. Relative paths
    /// resolve against the project root.
    pub fn corpus_dir(&self) -> PathBuf {
        let configured = PathBuf::from(&self.settings.data_processing.data_directory);
        if configured.is_absolute() {
            configured
        } else {
            self.paths.project_root.join(configured)
        }
    }

    /// Indexes the corpus directory in the background.
    pub fn spawn_corpus_indexing(self: &Arc<Self>) {
        if !self.settings.data_processing.index_on_startup {
            tracing::info!("Startup indexing disabled");
            return;
        }
        let state = self.clone();
        tokio::spawn(async move {
            let dir = state.corpus_dir();
            tracing::info!("Indexing federal ethics corpus under {}", dir.display());
            if let Err(e) = state.documents.index_corpus(&dir).await {
                tracing::warn!("Corpus indexing failed: {}", e);
            }
        });
    }
}
