// Retrieval Node
// Pulls federal ethics passages from the knowledge base.

use async_trait::async_trait;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{WorkflowStage, WorkflowState};

pub struct RetrieveKnowledgeNode;

impl RetrieveKnowledgeNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RetrieveKnowledgeNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for RetrieveKnowledgeNode {
    fn id(&self) -> &'static str {
        "retrieve_knowledge"
    }

    fn name(&self) -> &'static str {
        "Knowledge base retrieval"
    }

    fn stage(&self) -> WorkflowStage {
        WorkflowStage::Retrieving
    }

    async fn execute(
        &self,
        state: &mut WorkflowState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let chunks = ctx
            .services
            .retriever
            .retrieve(
                &state.question,
                state.retrieval_strategy,
                ctx.services.top_k,
            )
            .await
            .map_err(|e| GraphError::service(self.id(), e))?;

        tracing::info!(
            "Retrieved {} chunks with {} strategy",
            chunks.len(),
            state.retrieval_strategy
        );
        state.retrieved_chunks = chunks;
        Ok(NodeOutput::Continue(None))
    }
}
