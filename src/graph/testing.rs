//! In-crate fakes for workflow tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::config::Settings;
use crate::core::errors::ServiceError;
use crate::core::retry::RetryPolicy;
use crate::llm::{ChatRequest, LlmModels, LlmProvider, LlmService};
use crate::rag::{Retriever, SqliteVectorStore};
use crate::tools::search::{SearchKind, SearchResult, WebSearchProvider};

use super::node::WorkflowServices;

pub const GIFT_NARRATIVE: &str = "# Ethics Assessment

## Direct Answer
Accepting a $25 gift from a contractor exceeds the $20 de minimis exception.

## Severity Level
**[Minor]** - A single gift slightly above the threshold.

## Legal Foundation
- 5 C.F.R. § 2635.204(a) permits unsolicited gifts of $20 or less per occasion.

## Potential Penalties
Administrative discipline.

## Immediate Actions Required
1. Return the gift or pay its market value.

## Reporting Requirements
Notify your Designated Agency Ethics Official.

## Prevention Strategy
Annual ethics training.

## Additional Context
None.
";

/// Planning replies with `plan`; primary calls walk through `narratives`,
/// repeating the last entry.
pub struct ScriptedLlm {
    pub plan: Result<String, ServiceError>,
    pub narratives: Vec<Result<String, ServiceError>>,
    pub primary_calls: Arc<AtomicUsize>,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self {
            plan: Ok("Key Ethics Areas: gifts from outside sources\nRETRIEVAL: similarity".into()),
            narratives: vec![Ok(GIFT_NARRATIVE.to_string())],
            primary_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn chat(&self, _request: ChatRequest, model_id: &str) -> Result<String, ServiceError> {
        if model_id == "planning" {
            return self.plan.clone();
        }
        let n = self.primary_calls.fetch_add(1, Ordering::SeqCst);
        let idx = n.min(self.narratives.len().saturating_sub(1));
        self.narratives
            .get(idx)
            .cloned()
            .unwrap_or_else(|| Ok(String::new()))
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

/// Web search whose branches can be delayed or failed by kind.
#[derive(Default)]
pub struct FakeSearch {
    pub delay: Option<(SearchKind, Duration)>,
    pub delay_all: Option<Duration>,
    pub fail: Option<SearchKind>,
}

pub fn kind_of(query: &str) -> SearchKind {
    if query.ends_with("criminal civil administrative") {
        SearchKind::Penalties
    } else if query.ends_with("precedent cases") {
        SearchKind::Guidance
    } else {
        SearchKind::General
    }
}

#[async_trait]
impl WebSearchProvider for FakeSearch {
    fn name(&self) -> &str {
        "fake-search"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ServiceError> {
        let kind = kind_of(query);
        if let Some(delay) = self.delay_all {
            tokio::time::sleep(delay).await;
        }
        if let Some((slow, delay)) = self.delay {
            if slow == kind {
                tokio::time::sleep(delay).await;
            }
        }
        if self.fail == Some(kind) {
            return Err(ServiceError::transport("fake-search", "unreachable"));
        }
        Ok(vec![SearchResult {
            title: format!("{} result", kind.as_str()),
            url: format!("https://www.oge.gov/{}", kind.as_str()),
            snippet: "Guidance text".to_string(),
            score: Some(0.9),
        }])
    }
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.openai.primary_model = "primary".into();
    settings.openai.planning_model = "planning".into();
    settings.workflow.retry_backoff_ms = 0;
    settings.web_search.timeout_seconds = 1;
    settings
}

pub async fn services_with(llm: ScriptedLlm, search: FakeSearch) -> WorkflowServices {
    let settings = settings();
    let path = std::env::temp_dir().join(format!(
        "integribot-graph-test-{}.db",
        uuid::Uuid::new_v4()
    ));
    let store = Arc::new(SqliteVectorStore::with_path(path).await.unwrap());
    let llm = LlmService::new(
        Arc::new(llm),
        LlmModels::from_settings(&settings),
        Duration::from_secs(5),
        RetryPolicy::new(0, Duration::ZERO),
    );
    let retriever = Retriever::new(store, llm.clone(), None, &settings);
    let mut services = WorkflowServices::new(llm, retriever, Arc::new(search), &settings);
    services.search_timeout = Duration::from_millis(200);
    services
}

pub async fn services(llm: ScriptedLlm) -> WorkflowServices {
    services_with(llm, FakeSearch::default()).await
}
