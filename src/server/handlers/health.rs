use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

async fn probe(check: impl Future<Output = bool>) -> &'static str {
    match tokio::time::timeout(CHECK_TIMEOUT, check).await {
        Ok(true) => "healthy",
        Ok(false) => "unhealthy",
        Err(_) => "timeout",
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (vector_store, llm, web_search) = tokio::join!(
        probe(state.store.health_check()),
        probe(state.llm.health_check()),
        probe(state.search.health_check()),
    );
    let reranker = match &state.reranker {
        Some(r) => r.name().to_string(),
        None => "not_configured".to_string(),
    };

    let status = if [vector_store, llm, web_search].iter().all(|s| *s == "healthy") {
        "healthy"
    } else {
        "degraded"
    };

    Json(json!({
        "status": status,
        "version": state.settings.api.version,
        "environment": state.settings.environment.name,
        "services": {
            "vector_store": vector_store,
            "vector_backend": state.store.name(),
            "llm": llm,
            "llm_provider": state.llm.provider_name(),
            "web_search": web_search,
            "reranker": reranker,
        }
    }))
}

pub async fn ping() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "message": state.settings.api.title,
        "version": state.settings.api.version,
        "docs": "/api/health",
    }))
}
