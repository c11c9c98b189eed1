// Workflow Nodes
// One node per consultation step

pub mod assess;
pub mod combine;
pub mod context;
pub mod finalize;
pub mod planner;
pub mod retrieve;
pub mod search;

pub use assess::AssessViolationNode;
pub use combine::CombineResultsNode;
pub use context::CollectContextNode;
pub use finalize::FinalizeNode;
pub use planner::PlannerNode;
pub use retrieve::RetrieveKnowledgeNode;
pub use search::ParallelSearchNode;
