// Node trait and types
// Base abstraction for workflow graph nodes

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::config::Settings;
use crate::core::errors::{ApiError, ServiceError};
use crate::core::retry::RetryPolicy;
use crate::llm::LlmService;
use crate::rag::{RetrievalStrategy, Retriever};
use crate::tools::search::WebSearchProvider;

use super::events::EventSink;
use super::state::{WorkflowStage, WorkflowState};

/// External collaborators and tuning shared by every node.
#[derive(Clone)]
pub struct WorkflowServices {
    pub llm: LlmService,
    pub retriever: Retriever,
    pub search: Arc<dyn WebSearchProvider>,
    pub top_k: usize,
    pub default_strategy: RetrievalStrategy,
    /// Per-branch budget for each web search.
    pub search_timeout: Duration,
    /// Extra assessment attempts when the narrative has no usable severity.
    pub assessment_retries: u32,
    pub retry: RetryPolicy,
}

impl WorkflowServices {
    pub fn new(
        llm: LlmService,
        retriever: Retriever,
        search: Arc<dyn WebSearchProvider>,
        settings: &Settings,
    ) -> Self {
        Self {
            llm,
            retriever,
            search,
            top_k: settings.retrieval.top_k,
            default_strategy: settings
                .retrieval
                .default_strategy
                .parse()
                .unwrap_or_default(),
            search_timeout: Duration::from_secs(settings.web_search.timeout_seconds),
            assessment_retries: settings.workflow.max_retries,
            retry: settings.retry_policy(),
        }
    }
}

/// Context passed to nodes during execution
pub struct NodeContext<'a> {
    pub services: &'a WorkflowServices,
    /// Step-status stream for the client
    pub events: &'a EventSink,
}

/// Output from a node execution
#[derive(Debug, Clone)]
pub enum NodeOutput {
    /// Continue to the specified next node (None = use default edge)
    Continue(Option<String>),
    /// Branch to one of the specified nodes based on condition
    Branch(String),
    /// Graph execution complete
    Final,
    /// Error occurred
    Error(String),
}

/// Graph execution error
///
/// `execution_trace` records the node IDs visited before the failure,
/// most-recent last.
#[derive(Debug, Clone)]
pub struct GraphError {
    pub node_id: String,
    pub message: String,
    pub execution_trace: Vec<String>,
}

impl GraphError {
    pub fn new(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            message: message.into(),
            execution_trace: Vec::new(),
        }
    }

    pub fn service(node_id: impl Into<String>, err: ServiceError) -> Self {
        Self::new(node_id, err.to_string())
    }

    pub fn with_trace_entry(mut self, node_id: impl Into<String>) -> Self {
        self.execution_trace.push(node_id.into());
        self
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        ApiError::internal(err)
    }
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.execution_trace.is_empty() {
            write!(f, "{} failed: {}", self.node_id, self.message)
        } else {
            write!(
                f,
                "{} failed (trace: {}): {}",
                self.node_id,
                self.execution_trace.join(" -> "),
                self.message
            )
        }
    }
}

impl std::error::Error for GraphError {}

#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> &'static str;

    /// Human-readable name for events and logs
    fn name(&self) -> &'static str {
        self.id()
    }

    /// Stage the workflow is in while this node runs
    fn stage(&self) -> WorkflowStage;

    async fn execute(
        &self,
        state: &mut WorkflowState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError>;
}
