use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::{self, Stream};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::core::errors::ApiError;
use crate::graph::{EventSink, WorkflowEvent, WorkflowFailure, WorkflowState};
use crate::models::{ChatRequest, ChatResponse};
use crate::state::AppState;

type RunResult = Result<WorkflowState, WorkflowFailure>;

fn parse_request(payload: Result<Json<ChatRequest>, JsonRejection>) -> Result<ChatRequest, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    request.validate()
}

/// Runs one consultation to completion and returns the whole response.
pub async fn assess(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = parse_request(payload)?;
    let started = Instant::now();

    let result = state.workflow.run(request, EventSink::disabled()).await;
    match result {
        Ok(final_state) => Ok(Json(ChatResponse::from_state(
            &final_state,
            started.elapsed().as_secs_f64(),
        ))),
        Err(failure) => Err(ApiError::Internal(failure.to_string())),
    }
}

enum StreamPhase {
    Steps {
        events: UnboundedReceiver<WorkflowEvent>,
        run: JoinHandle<RunResult>,
        started: Instant,
    },
    Done,
    Closed,
}

fn step_event(event: &WorkflowEvent) -> Event {
    Event::default()
        .event("step")
        .json_data(event)
        .unwrap_or_else(|_| Event::default().event("step").data(event.message.clone()))
}

fn outcome_event(outcome: Result<RunResult, tokio::task::JoinError>, started: Instant) -> Event {
    let elapsed = started.elapsed().as_secs_f64();
    let (name, payload) = match outcome {
        Ok(Ok(final_state)) => (
            "complete",
            serde_json::to_value(ChatResponse::from_state(&final_state, elapsed))
                .unwrap_or_else(|e| json!({ "error": e.to_string() })),
        ),
        Ok(Err(failure)) => (
            "error",
            json!({
                "error": failure.error.message,
                "node": failure.error.node_id,
                "stage": failure.state.stage,
                "processing_time_seconds": elapsed,
            }),
        ),
        Err(e) => ("error", json!({ "error": format!("consultation aborted: {}", e) })),
    };
    Event::default().event(name).data(payload.to_string())
}

/// Streams step events while the consultation runs, then the final
/// response (or error) and a `[DONE]` marker.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request = parse_request(payload)?;
    let (sink, events) = EventSink::channel();

    let workflow = state.workflow.clone();
    let run = tokio::spawn(async move { workflow.run(request, sink).await });

    let phase = StreamPhase::Steps {
        events,
        run,
        started: Instant::now(),
    };

    let stream = stream::unfold(phase, |phase| async move {
        match phase {
            StreamPhase::Steps {
                mut events,
                run,
                started,
            } => match events.recv().await {
                Some(event) => Some((
                    Ok(step_event(&event)),
                    StreamPhase::Steps {
                        events,
                        run,
                        started,
                    },
                )),
                // The sink is dropped when the run returns.
                None => Some((Ok(outcome_event(run.await, started)), StreamPhase::Done)),
            },
            StreamPhase::Done => Some((Ok(Event::default().data("[DONE]")), StreamPhase::Closed)),
            StreamPhase::Closed => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
