// Combine Node
// Fan-in point after the parallel searches.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{WorkflowStage, WorkflowState};

pub struct CombineResultsNode;

impl CombineResultsNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CombineResultsNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for CombineResultsNode {
    fn id(&self) -> &'static str {
        "combine_results"
    }

    fn name(&self) -> &'static str {
        "Combine results"
    }

    fn stage(&self) -> WorkflowStage {
        WorkflowStage::Combining
    }

    async fn execute(
        &self,
        state: &mut WorkflowState,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let mut seen = HashSet::new();
        state.web_results = state
            .search_results
            .iter_tagged()
            .filter(|(_, result)| seen.insert(result.url.clone()))
            .map(|(_, result)| result.clone())
            .collect();

        tracing::info!(
            "Combined {} web results ({} unique) with {} knowledge base chunks",
            state.search_results.len(),
            state.web_results.len(),
            state.retrieved_chunks.len()
        );
        Ok(NodeOutput::Continue(None))
    }
}
