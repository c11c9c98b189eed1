// Graph Builder
// Constructs the consultation graph using petgraph

use super::node::GraphError;
use super::nodes::{
    AssessViolationNode, CollectContextNode, CombineResultsNode, FinalizeNode, ParallelSearchNode,
    PlannerNode, RetrieveKnowledgeNode,
};
use super::runtime::{GraphBuilder, GraphRuntime};

/// Build the ethics consultation graph:
/// context -> plan -> retrieve -> search -> combine -> assess -> finalize
pub fn build_ethics_graph(max_steps: usize) -> Result<GraphRuntime, GraphError> {
    GraphBuilder::new()
        .entry("collect_context")
        .max_steps(max_steps)
        .node(Box::new(CollectContextNode::new()))
        .node(Box::new(PlannerNode::new()))
        .node(Box::new(RetrieveKnowledgeNode::new()))
        .node(Box::new(ParallelSearchNode::new()))
        .node(Box::new(CombineResultsNode::new()))
        .node(Box::new(AssessViolationNode::new()))
        .node(Box::new(FinalizeNode::new()))
        .edge("collect_context", "create_plan")
        .edge("create_plan", "retrieve_knowledge")
        .edge("retrieve_knowledge", "parallel_search")
        .edge("parallel_search", "combine_results")
        .edge("combine_results", "assess_violation")
        .edge("assess_violation", "finalize")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_is_linear_and_acyclic() {
        let graph = build_ethics_graph(20).unwrap();
        assert!(!graph.has_cycle());
        let mut ids = graph.node_ids();
        ids.sort();
        assert_eq!(
            ids,
            vec![
                "assess_violation",
                "collect_context",
                "combine_results",
                "create_plan",
                "finalize",
                "parallel_search",
                "retrieve_knowledge",
            ]
        );
    }
}
