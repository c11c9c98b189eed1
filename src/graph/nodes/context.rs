// Context Node
// Normalizes the caller's profile before planning.

use async_trait::async_trait;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{WorkflowStage, WorkflowState};

pub struct CollectContextNode;

impl CollectContextNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CollectContextNode {
    fn default() -> Self {
        Self::new()
    }
}

fn clean(value: &mut Option<String>) {
    *value = value
        .take()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
}

#[async_trait]
impl Node for CollectContextNode {
    fn id(&self) -> &'static str {
        "collect_context"
    }

    fn name(&self) -> &'static str {
        "Collect context"
    }

    fn stage(&self) -> WorkflowStage {
        WorkflowStage::CollectingContext
    }

    async fn execute(
        &self,
        state: &mut WorkflowState,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let profile = &mut state.user_context;
        clean(&mut profile.agency);
        clean(&mut profile.seniority);
        clean(&mut profile.grade_level);

        tracing::info!(
            "Consultation started: {} chars, {}",
            state.question.chars().count(),
            state.user_context
        );
        Ok(NodeOutput::Continue(None))
    }
}
