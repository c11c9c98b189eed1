// Ethics Workflow
// Owns the compiled graph and the services its nodes share.

use std::sync::Arc;
use std::time::Instant;

use crate::core::config::Settings;
use crate::models::ChatRequest;

use super::builder::build_ethics_graph;
use super::events::{EventSink, StepStatus};
use super::node::{GraphError, NodeContext, WorkflowServices};
use super::runtime::GraphRuntime;
use super::state::{WorkflowStage, WorkflowState};

/// A run that stopped before `finalize`. The state is kept so callers can
/// report how far it got.
#[derive(Debug)]
pub struct WorkflowFailure {
    pub state: Box<WorkflowState>,
    pub error: GraphError,
}

impl std::fmt::Display for WorkflowFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "consultation failed: {}", self.error)
    }
}

impl std::error::Error for WorkflowFailure {}

#[derive(Clone)]
pub struct EthicsWorkflow {
    runtime: Arc<GraphRuntime>,
    services: WorkflowServices,
}

impl EthicsWorkflow {
    pub fn new(services: WorkflowServices, settings: &Settings) -> Result<Self, GraphError> {
        Ok(Self {
            runtime: Arc::new(build_ethics_graph(settings.workflow.max_steps)?),
            services,
        })
    }

    /// Runs one consultation. Step events go to `events` as they happen; a
    /// failure leaves the state in `Failed` with no assessment.
    pub async fn run(
        &self,
        request: ChatRequest,
        events: EventSink,
    ) -> Result<WorkflowState, WorkflowFailure> {
        let mut state = WorkflowState::new(request.question, request.user_context);
        let mut ctx = NodeContext {
            services: &self.services,
            events: &events,
        };

        let started = Instant::now();
        let result = self.runtime.run(&mut state, &mut ctx).await;
        state.record_timing("total", started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                tracing::info!(
                    "Consultation finalized in {:.2}s ({} chunks, {} web results)",
                    started.elapsed().as_secs_f64(),
                    state.retrieved_chunks.len(),
                    state.web_results.len()
                );
                Ok(state)
            }
            Err(error) => {
                tracing::error!("Consultation failed: {}", error);
                let failed_at = state.stage;
                state.stage = WorkflowStage::Failed;
                state.assessment = None;
                state.narrative = None;
                events.step(
                    WorkflowStage::Failed,
                    StepStatus::Failed,
                    format!("Failed during {}: {}", failed_at.as_str(), error.message),
                );
                Err(WorkflowFailure {
                    state: Box::new(state),
                    error,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ServiceError;
    use crate::graph::events::WorkflowEvent;
    use crate::graph::testing::{self, FakeSearch, ScriptedLlm};
    use crate::models::Severity;
    use std::time::Duration;

    async fn workflow(llm: ScriptedLlm, search: FakeSearch) -> EthicsWorkflow {
        let services = testing::services_with(llm, search).await;
        EthicsWorkflow::new(services, &testing::settings()).unwrap()
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn consultation_runs_to_finalized() {
        let workflow = workflow(ScriptedLlm::default(), FakeSearch::default()).await;
        let (events, mut rx) = EventSink::channel();

        let state = workflow
            .run(ChatRequest::new("Can I accept a $25 gift?", None), events)
            .await
            .unwrap();

        assert_eq!(state.stage, WorkflowStage::Finalized);
        assert_eq!(state.assessment.as_ref().unwrap().severity, Severity::Minor);
        assert_eq!(state.web_results.len(), 3);
        for step in ["create_plan", "parallel_search", "assess_violation", "total"] {
            assert!(state.timings.contains_key(step), "missing timing {}", step);
        }

        let emitted = drain(&mut rx);
        assert_eq!(emitted.first().unwrap().stage, WorkflowStage::CollectingContext);
        assert_eq!(emitted.last().unwrap().stage, WorkflowStage::Finalized);
        assert_eq!(emitted.last().unwrap().status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn all_searches_timing_out_still_finalizes() {
        let workflow = workflow(
            ScriptedLlm::default(),
            FakeSearch {
                delay_all: Some(Duration::from_secs(5)),
                ..Default::default()
            },
        )
        .await;
        let (events, mut rx) = EventSink::channel();

        let state = workflow
            .run(ChatRequest::new("Can I accept a gift?", None), events)
            .await
            .unwrap();

        assert_eq!(state.stage, WorkflowStage::Finalized);
        assert!(state.search_results.is_empty());
        assert!(state.web_results.is_empty());
        assert!(state.assessment.is_some());

        let degraded = drain(&mut rx)
            .into_iter()
            .filter(|e| e.status == StepStatus::Degraded)
            .count();
        assert_eq!(degraded, 3);
    }

    #[tokio::test]
    async fn assessment_failure_ends_in_failed_stage() {
        let llm = ScriptedLlm {
            narratives: vec![Err(ServiceError::Status {
                service: "openai".into(),
                status: 401,
                body: "invalid api key".into(),
            })],
            ..Default::default()
        };
        let workflow = workflow(llm, FakeSearch::default()).await;
        let (events, mut rx) = EventSink::channel();

        let failure = workflow
            .run(ChatRequest::new("Can I accept a gift?", None), events)
            .await
            .unwrap_err();

        assert_eq!(failure.state.stage, WorkflowStage::Failed);
        assert!(failure.state.assessment.is_none());
        assert_eq!(failure.error.node_id, "assess_violation");
        assert!(failure
            .error
            .execution_trace
            .contains(&"parallel_search".to_string()));

        let last = drain(&mut rx).pop().unwrap();
        assert_eq!(last.stage, WorkflowStage::Failed);
        assert_eq!(last.status, StepStatus::Failed);
    }
}
