// Finalize Node
// Terminal node; marks the consultation complete.

use async_trait::async_trait;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{WorkflowStage, WorkflowState};

pub struct FinalizeNode;

impl FinalizeNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FinalizeNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for FinalizeNode {
    fn id(&self) -> &'static str {
        "finalize"
    }

    fn name(&self) -> &'static str {
        "Finalize"
    }

    fn stage(&self) -> WorkflowStage {
        WorkflowStage::Finalized
    }

    async fn execute(
        &self,
        state: &mut WorkflowState,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        if state.assessment.is_none() {
            return Err(GraphError::new(
                self.id(),
                "reached finalize without an assessment",
            ));
        }
        Ok(NodeOutput::Final)
    }
}
