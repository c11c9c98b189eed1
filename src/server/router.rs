use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, config, documents, health};
use crate::state::AppState;

/// Room for multipart framing and the text fields around the file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Creates the main application router with all routes and middleware.
///
/// This function sets up:
/// - CORS middleware and the request body limit
/// - Health and banner endpoints
/// - Consultation endpoints (streaming and JSON)
/// - Document management endpoints
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.security.cors_origins);
    let body_limit = state.documents.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/api/health", get(health::health))
        .route("/api/ping", get(health::ping))
        .route("/api/config", get(config::get_config))
        .route("/api/chat", post(chat::chat))
        .route("/api/chat/stream", post(chat::chat))
        .route("/api/assess", post(chat::assess))
        .route(
            "/api/documents",
            get(documents::list_documents).post(documents::upload_document),
        )
        .route("/api/documents/list", get(documents::list_documents))
        .route("/api/documents/upload", post(documents::upload_document))
        .route(
            "/api/documents/:document_id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.iter().any(|origin| origin.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let allowed = origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect::<Vec<_>>();

    layer.allow_origin(AllowOrigin::list(allowed))
}
