//! Shared fakes and app construction for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use integribot_backend::core::config::{AppPaths, ConfigService, Settings};
use integribot_backend::core::errors::ServiceError;
use integribot_backend::llm::{ChatRequest, LlmProvider, LlmService};
use integribot_backend::rag::{DocumentRegistry, SqliteVectorStore};
use integribot_backend::server;
use integribot_backend::state::AppState;
use integribot_backend::tools::search::{SearchResult, WebSearchProvider};

pub const NARRATIVE: &str = "# Ethics Assessment

## Direct Answer
A $25 gift from a prohibited source exceeds the $20 de minimis exception.

## Severity Level
**[Minor]** - One gift, modest value, no evidence of intent.

## Legal Foundation
- 5 C.F.R. § 2635.204(a)
- 5 C.F.R. § 2635.202

## Potential Penalties
Administrative discipline up to reprimand.

## Immediate Actions Required
1. Return the gift or pay its market value.
2. Notify your supervisor.

## Reporting Requirements
Tell your Designated Agency Ethics Official.

## Prevention Strategy
Review gift rules annually.

## Additional Context
None.
";

#[derive(Default)]
pub struct FakeLlm {
    pub fail_primary: bool,
}

#[async_trait]
impl LlmProvider for FakeLlm {
    fn name(&self) -> &str {
        "fake-llm"
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn chat(&self, _request: ChatRequest, model_id: &str) -> Result<String, ServiceError> {
        if model_id == "planning" {
            return Ok("1. Key Ethics Areas: gifts\nRETRIEVAL: mmr".to_string());
        }
        if self.fail_primary {
            return Err(ServiceError::Status {
                service: "fake-llm".into(),
                status: 401,
                body: "invalid api key".into(),
            });
        }
        Ok(NARRATIVE.to_string())
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(inputs
            .iter()
            .map(|text| vec![1.0, (text.len() % 13) as f32 / 13.0, 0.5])
            .collect())
    }
}

#[derive(Default)]
pub struct FakeSearch {
    pub delay: Option<Duration>,
    pub fail: bool,
}

#[async_trait]
impl WebSearchProvider for FakeSearch {
    fn name(&self) -> &str {
        "fake-search"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ServiceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ServiceError::transport("fake-search", "connection refused"));
        }
        let slug = query.len();
        Ok(vec![SearchResult {
            title: format!("OGE guidance {}", slug),
            url: format!("https://www.oge.gov/guidance/{}", slug),
            snippet: "Gifts from outside sources are limited to $20 per occasion.".to_string(),
            score: Some(0.8),
        }])
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    _dir: TempDir,
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.openai.api_key = Some("sk-test-secret".into());
    settings.openai.primary_model = "primary".into();
    settings.openai.planning_model = "planning".into();
    settings.web_search.api_key = Some("tvly-test-secret".into());
    settings.web_search.timeout_seconds = 1;
    settings.vector_database.backend = "sqlite".into();
    settings.retrieval.top_k = 3;
    settings.workflow.retry_backoff_ms = 0;
    settings.data_processing.index_on_startup = false;
    settings
}

pub async fn test_app_with(llm: FakeLlm, search: FakeSearch, settings: Settings) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let paths = Arc::new(AppPaths::from_data_dir(dir.path()));
    let config = ConfigService::new(paths.clone());

    let llm = LlmService::from_settings(Arc::new(llm), &settings);
    let store = Arc::new(
        SqliteVectorStore::with_path(dir.path().join("vectors.db"))
            .await
            .unwrap(),
    );
    let registry = DocumentRegistry::with_path(&paths.db_path).await.unwrap();

    let state = AppState::from_parts(
        paths,
        config,
        settings,
        llm,
        store,
        Arc::new(search),
        None,
        registry,
    )
    .unwrap();
    let router = server::router(state.clone());

    TestApp {
        state,
        router,
        _dir: dir,
    }
}

pub async fn test_app() -> TestApp {
    test_app_with(FakeLlm::default(), FakeSearch::default(), settings()).await
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

const BOUNDARY: &str = "integribot-test-boundary";

/// `multipart/form-data` upload with an optional file part and text fields.
pub fn multipart_request(
    uri: &str,
    file: Option<(&str, &[u8])>,
    fields: &[(&str, &str)],
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/pdf\r\n\r\n",
                BOUNDARY, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// A single-page PDF with one Helvetica text line per entry, with a
/// correct cross-reference table.
pub fn pdf_with_lines(lines: &[&str]) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 12 Tf\n72 720 Td\n");
    for line in lines {
        let escaped = line
            .replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)");
        content.push_str(&format!("({}) Tj\n0 -14 Td\n", escaped));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
        format!("<< /Length {} >>\nstream\n{}endstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
    ];

    let mut pdf: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, object).as_bytes());
    }

    let xref_offset = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    pdf.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    pdf
}
