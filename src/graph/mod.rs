// Consultation Graph Module
// StateGraph-style workflow for ethics consultations

pub mod builder;
pub mod events;
pub mod node;
pub mod runtime;
pub mod state;
pub mod workflow;

pub mod nodes;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::build_ethics_graph;
pub use events::{EventSink, StepStatus, WorkflowEvent};
pub use node::{GraphError, Node, NodeContext, NodeOutput, WorkflowServices};
pub use runtime::GraphRuntime;
pub use state::{SearchResults, WorkflowStage, WorkflowState};
pub use workflow::{EthicsWorkflow, WorkflowFailure};
