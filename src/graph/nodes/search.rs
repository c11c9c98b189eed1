// Parallel Search Node
// Fans out the three web searches and joins them under a per-branch budget.

use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::core::retry::retry_with_backoff;
use crate::graph::events::{StepStatus, WorkflowEvent};
use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{WorkflowStage, WorkflowState};
use crate::tools::search::{SearchKind, SearchResult};

pub struct ParallelSearchNode;

impl ParallelSearchNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ParallelSearchNode {
    fn default() -> Self {
        Self::new()
    }
}

enum BranchOutcome {
    Found(Vec<SearchResult>),
    Failed(String),
    TimedOut,
}

#[async_trait]
impl Node for ParallelSearchNode {
    fn id(&self) -> &'static str {
        "parallel_search"
    }

    fn name(&self) -> &'static str {
        "Web search"
    }

    fn stage(&self) -> WorkflowStage {
        WorkflowStage::Searching
    }

    /// Never fails: a branch that errors or overruns its budget leaves its
    /// slot empty and is reported as degraded.
    async fn execute(
        &self,
        state: &mut WorkflowState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let services = ctx.services;
        let budget = services.search_timeout;
        let question = state.question.clone();

        for kind in SearchKind::ALL {
            ctx.events.emit(
                WorkflowEvent::new(
                    WorkflowStage::Searching,
                    StepStatus::Started,
                    format!("Searching {}", kind.label()),
                )
                .with_branch(kind),
            );
        }

        let branches = SearchKind::ALL.into_iter().map(|kind| {
            let query = kind.query_for(&question);
            async move {
                let started = Instant::now();
                let operation = format!("{} {} search", services.search.name(), kind.as_str());
                let call = retry_with_backoff(&services.retry, &operation, || {
                    services.search.search(&query)
                });
                let outcome = match tokio::time::timeout(budget, call).await {
                    Ok(Ok(results)) => BranchOutcome::Found(results),
                    Ok(Err(e)) => BranchOutcome::Failed(e.to_string()),
                    Err(_) => BranchOutcome::TimedOut,
                };
                (kind, outcome, started.elapsed().as_secs_f64())
            }
        });

        for (kind, outcome, elapsed) in join_all(branches).await {
            state.record_timing(&format!("search_{}", kind.as_str()), elapsed);
            match outcome {
                BranchOutcome::Found(results) => {
                    tracing::debug!("{} search returned {} hits", kind.as_str(), results.len());
                    ctx.events.emit(
                        WorkflowEvent::new(
                            WorkflowStage::Searching,
                            StepStatus::Completed,
                            format!("{} search returned {} results", kind.label(), results.len()),
                        )
                        .with_branch(kind)
                        .with_elapsed(elapsed),
                    );
                    state.search_results.set(kind, results);
                }
                BranchOutcome::Failed(message) => {
                    tracing::warn!("{} search failed, continuing without it: {}", kind.as_str(), message);
                    state.search_results.set(kind, Vec::new());
                    ctx.events.emit(
                        WorkflowEvent::new(
                            WorkflowStage::Searching,
                            StepStatus::Degraded,
                            format!("{} search unavailable: {}", kind.label(), message),
                        )
                        .with_branch(kind)
                        .with_elapsed(elapsed),
                    );
                }
                BranchOutcome::TimedOut => {
                    tracing::warn!(
                        "{} search timed out after {:?}, continuing without it",
                        kind.as_str(),
                        budget
                    );
                    state.search_results.set(kind, Vec::new());
                    ctx.events.emit(
                        WorkflowEvent::new(
                            WorkflowStage::Searching,
                            StepStatus::Degraded,
                            format!("{} search timed out", kind.label()),
                        )
                        .with_branch(kind)
                        .with_elapsed(elapsed),
                    );
                }
            }
        }

        Ok(NodeOutput::Continue(None))
    }
}
