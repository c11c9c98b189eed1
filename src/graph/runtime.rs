// Graph Runtime - petgraph based
// StateGraph execution engine for the consultation workflow

use std::collections::HashMap;
use std::time::Instant;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::events::{StepStatus, WorkflowEvent};
use super::node::{GraphError, Node, NodeContext, NodeOutput};
use super::state::WorkflowState;

/// Edge condition for graph routing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeCondition {
    /// Always follow this edge (default edge)
    Always,
    /// Follow this edge when the node returns this condition
    OnCondition(String),
}

impl EdgeCondition {
    pub fn on(condition: impl Into<String>) -> Self {
        Self::OnCondition(condition.into())
    }

    pub fn matches(&self, condition: Option<&str>) -> bool {
        match (self, condition) {
            (EdgeCondition::Always, None) => true,
            (EdgeCondition::OnCondition(expected), Some(actual)) => expected == actual,
            _ => false,
        }
    }
}

pub struct GraphRuntime {
    graph: DiGraph<Box<dyn Node>, EdgeCondition>,
    node_indices: HashMap<String, NodeIndex>,
    entry_node_id: String,
    /// Recursion limit
    max_steps: usize,
}

impl GraphRuntime {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_indices: HashMap::new(),
            entry_node_id: String::new(),
            max_steps: 20,
        }
    }

    pub fn add_node(&mut self, node: Box<dyn Node>) -> NodeIndex {
        let id = node.id().to_string();
        let index = self.graph.add_node(node);
        self.node_indices.insert(id, index);
        index
    }

    pub fn add_conditional_edge(
        &mut self,
        from: &str,
        to: &str,
        condition: EdgeCondition,
    ) -> Result<(), GraphError> {
        let from_idx = self
            .node_indices
            .get(from)
            .ok_or_else(|| GraphError::new(from, format!("Source node not found: {}", from)))?;
        let to_idx = self
            .node_indices
            .get(to)
            .ok_or_else(|| GraphError::new(to, format!("Target node not found: {}", to)))?;

        self.graph.add_edge(*from_idx, *to_idx, condition);
        Ok(())
    }

    #[cfg(test)]
    pub fn node_ids(&self) -> Vec<&str> {
        self.node_indices.keys().map(|s| s.as_str()).collect()
    }

    #[cfg(test)]
    pub fn has_cycle(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Runs from the entry node until a node returns `Final`. Every node's
    /// wall time lands in `state.timings` under its id, and a started /
    /// completed (or failed) event pair is emitted around it.
    pub async fn run(
        &self,
        state: &mut WorkflowState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<(), GraphError> {
        if self.entry_node_id.is_empty() {
            return Err(GraphError::new("runtime", "No entry node set"));
        }

        let mut current_idx = *self.node_indices.get(&self.entry_node_id).ok_or_else(|| {
            GraphError::new(
                "runtime",
                format!("Entry node not found: {}", self.entry_node_id),
            )
        })?;

        let mut trace: Vec<&'static str> = Vec::new();

        for step in 0..self.max_steps {
            let node = self
                .graph
                .node_weight(current_idx)
                .ok_or_else(|| GraphError::new("runtime", "Node not found in graph"))?;

            let node_id = node.id();
            let stage = node.stage();
            tracing::debug!("Executing node: {} (step {})", node_id, step);

            state.stage = stage;
            ctx.events.step(stage, StepStatus::Started, node.name());

            let started = Instant::now();
            let result = node.execute(state, ctx).await;
            let elapsed = started.elapsed().as_secs_f64();
            state.record_timing(node_id, elapsed);

            let routing = match result {
                Ok(NodeOutput::Final) => Ok(None),
                Ok(NodeOutput::Continue(next)) => Ok(Some((None, next))),
                Ok(NodeOutput::Branch(condition)) => Ok(Some((Some(condition), None))),
                Ok(NodeOutput::Error(msg)) => Err(GraphError::new(node_id, msg)),
                Err(err) => Err(err),
            };

            let routing = match routing {
                Ok(routing) => routing,
                Err(err) => {
                    ctx.events.emit(
                        WorkflowEvent::new(stage, StepStatus::Failed, err.message.clone())
                            .with_elapsed(elapsed),
                    );
                    return Err(trace
                        .iter()
                        .fold(err, |err, visited| err.with_trace_entry(*visited)));
                }
            };

            ctx.events.emit(
                WorkflowEvent::new(stage, StepStatus::Completed, node.name())
                    .with_elapsed(elapsed),
            );
            trace.push(node_id);

            let Some((condition, explicit_next)) = routing else {
                tracing::debug!("Graph execution complete at node: {}", node_id);
                return Ok(());
            };
            current_idx = self.resolve_next_node(
                current_idx,
                condition.as_deref(),
                explicit_next.as_deref(),
            )?;
        }

        Err(GraphError::new(
            "runtime",
            format!("Maximum steps ({}) exceeded", self.max_steps),
        ))
    }

    fn resolve_next_node(
        &self,
        current_idx: NodeIndex,
        condition: Option<&str>,
        explicit: Option<&str>,
    ) -> Result<NodeIndex, GraphError> {
        let current_id = self
            .graph
            .node_weight(current_idx)
            .map(|n| n.id())
            .unwrap_or("unknown");

        if let Some(next_id) = explicit {
            return self.node_indices.get(next_id).copied().ok_or_else(|| {
                GraphError::new(current_id, format!("Explicit target node not found: {}", next_id))
            });
        }

        let edges: Vec<(NodeIndex, &EdgeCondition)> = self
            .graph
            .edges_directed(current_idx, Direction::Outgoing)
            .map(|edge| (edge.target(), edge.weight()))
            .collect();

        if edges.is_empty() {
            return Err(GraphError::new(
                current_id,
                format!("No outgoing edges from node: {}", current_id),
            ));
        }

        if let Some(target) = edges
            .iter()
            .find(|(_, weight)| condition.is_some() && weight.matches(condition))
        {
            return Ok(target.0);
        }

        if let Some(target) = edges.iter().find(|(_, weight)| weight.matches(None)) {
            if let Some(cond) = condition {
                tracing::warn!(
                    "Condition '{}' not matched for node '{}', using default edge",
                    cond,
                    current_id
                );
            }
            return Ok(target.0);
        }

        Err(GraphError::new(
            current_id,
            format!(
                "No matching edge for condition: {:?}",
                condition.unwrap_or("(none)")
            ),
        ))
    }
}

impl Default for GraphRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing graphs fluently
pub struct GraphBuilder {
    runtime: GraphRuntime,
    pending_edges: Vec<(String, String, EdgeCondition)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            runtime: GraphRuntime::new(),
            pending_edges: Vec::new(),
        }
    }

    pub fn entry(mut self, node_id: impl Into<String>) -> Self {
        self.runtime.entry_node_id = node_id.into();
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.runtime.max_steps = max_steps;
        self
    }

    pub fn node(mut self, node: Box<dyn Node>) -> Self {
        self.runtime.add_node(node);
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.pending_edges
            .push((from.into(), to.into(), EdgeCondition::Always));
        self
    }

    pub fn conditional_edge(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        self.pending_edges
            .push((from.into(), to.into(), EdgeCondition::on(condition)));
        self
    }

    pub fn build(mut self) -> Result<GraphRuntime, GraphError> {
        for (from, to, condition) in self.pending_edges {
            self.runtime.add_conditional_edge(&from, &to, condition)?;
        }
        Ok(self.runtime)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
