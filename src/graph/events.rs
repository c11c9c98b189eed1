// Workflow step events
// Progress notifications streamed to the client while a consultation runs.

use serde::Serialize;
use tokio::sync::mpsc;

use super::state::WorkflowStage;
use crate::tools::search::SearchKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowEvent {
    pub stage: WorkflowStage,
    pub status: StepStatus,
    pub message: String,
    /// Web-search branch, on `searching` events from a single branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<SearchKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
}

impl WorkflowEvent {
    pub fn new(stage: WorkflowStage, status: StepStatus, message: impl Into<String>) -> Self {
        Self {
            stage,
            status,
            message: message.into(),
            branch: None,
            elapsed_seconds: None,
        }
    }

    pub fn with_branch(mut self, kind: SearchKind) -> Self {
        self.branch = Some(kind);
        self
    }

    pub fn with_elapsed(mut self, seconds: f64) -> Self {
        self.elapsed_seconds = Some(seconds);
        self
    }
}

/// Optional event channel. Sends never fail the workflow: a client that
/// disconnected simply stops receiving.
#[derive(Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: WorkflowEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                tracing::debug!("Event receiver dropped; continuing without streaming");
            }
        }
    }

    pub fn step(&self, stage: WorkflowStage, status: StepStatus, message: impl Into<String>) {
        self.emit(WorkflowEvent::new(stage, status, message));
    }
}
