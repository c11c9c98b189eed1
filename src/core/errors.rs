use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            ApiError::UnsupportedMediaType(msg) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg.clone())
            }
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

/// Failure of a call to an external collaborator (LLM, vector database,
/// web search, reranker).
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("{service} request failed: {message}")]
    Transport { service: String, message: String },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{service} timed out after {seconds}s")]
    Timeout { service: String, seconds: u64 },

    #[error("{service} returned an unexpected payload: {message}")]
    Decode { service: String, message: String },

    #[error("{service} backend error: {message}")]
    Backend { service: String, message: String },
}

impl ServiceError {
    pub fn transport(service: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            service: service.into(),
            message: err.to_string(),
        }
    }

    pub fn decode(service: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            service: service.into(),
            message: err.to_string(),
        }
    }

    pub fn backend(service: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            service: service.into(),
            message: err.to_string(),
        }
    }

    pub fn timeout(service: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            service: service.into(),
            seconds,
        }
    }

    /// Transport failures, timeouts, throttling and 5xx responses are
    /// worth another attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Transport { .. } | ServiceError::Timeout { .. } => true,
            ServiceError::Status { status, .. } => *status == 429 || *status >= 500,
            ServiceError::Decode { .. } | ServiceError::Backend { .. } => false,
        }
    }

    pub fn service(&self) -> &str {
        match self {
            ServiceError::Transport { service, .. }
            | ServiceError::Status { service, .. }
            | ServiceError::Timeout { service, .. }
            | ServiceError::Decode { service, .. }
            | ServiceError::Backend { service, .. } => service,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::ServiceUnavailable(err.to_string())
    }
}

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required credential `{key}` (set {env} or {path} in secrets.yaml)")]
    MissingCredential {
        key: &'static str,
        env: &'static str,
        path: &'static str,
    },

    #[error("invalid configuration `{field}`: {message}")]
    Invalid { field: String, message: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}
