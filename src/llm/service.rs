use std::sync::Arc;
use std::time::Duration;

use super::provider::LlmProvider;
use super::types::{ChatMessage, ChatRequest};
use crate::core::config::Settings;
use crate::core::errors::ServiceError;
use crate::core::retry::{retry_with_backoff, RetryPolicy};

/// Model roles and generation defaults resolved from settings.
#[derive(Debug, Clone)]
pub struct LlmModels {
    pub primary: String,
    pub planning: String,
    pub embedding: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl LlmModels {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            primary: settings.openai.primary_model.clone(),
            planning: settings.openai.planning_model.clone(),
            embedding: settings.openai.embedding_model.clone(),
            temperature: settings.openai.temperature,
            max_tokens: settings.openai.max_tokens,
        }
    }
}

/// Provider wrapper adding a per-call timeout and retry with backoff.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    models: LlmModels,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl LlmService {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        models: LlmModels,
        call_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            models,
            call_timeout,
            retry,
        }
    }

    pub fn from_settings(provider: Arc<dyn LlmProvider>, settings: &Settings) -> Self {
        Self::new(
            provider,
            LlmModels::from_settings(settings),
            Duration::from_secs(settings.openai.timeout_seconds),
            settings.retry_policy(),
        )
    }

    pub fn models(&self) -> &LlmModels {
        &self.models
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await
    }

    /// Completion on the primary (assessment) model.
    pub async fn chat_primary(&self, messages: Vec<ChatMessage>) -> Result<String, ServiceError> {
        let request = ChatRequest::new(messages)
            .with_temperature(self.models.temperature)
            .with_max_tokens(self.models.max_tokens);
        let model = self.models.primary.clone();
        self.chat_with_model(request, &model).await
    }

    /// Completion on the lightweight planning model.
    pub async fn chat_planning(&self, messages: Vec<ChatMessage>) -> Result<String, ServiceError> {
        let request = ChatRequest::new(messages).with_temperature(self.models.temperature);
        let model = self.models.planning.clone();
        self.chat_with_model(request, &model).await
    }

    pub async fn chat_with_model(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<String, ServiceError> {
        let operation = format!("{} chat ({})", self.provider.name(), model_id);
        retry_with_backoff(&self.retry, &operation, || {
            let request = request.clone();
            async move {
                let call = self.provider.chat(request, model_id);
                match tokio::time::timeout(self.call_timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(ServiceError::timeout(
                        self.provider.name(),
                        self.call_timeout.as_secs(),
                    )),
                }
            }
        })
        .await
    }

    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let model_id = self.models.embedding.as_str();
        let operation = format!("{} embed ({} inputs)", self.provider.name(), inputs.len());
        retry_with_backoff(&self.retry, &operation, || async move {
            let call = self.provider.embed(inputs, model_id);
            match tokio::time::timeout(self.call_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::timeout(
                    self.provider.name(),
                    self.call_timeout.as_secs(),
                )),
            }
        })
        .await
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ServiceError::decode(self.provider.name(), "empty embedding response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        failures_before_success: u32,
        calls: AtomicU32,
        delay: Duration,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ServiceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if n < self.failures_before_success {
                return Err(ServiceError::transport("flaky", "connection reset"));
            }
            Ok(format!("{}:{}", model_id, request.messages.len()))
        }

        async fn embed(
            &self,
            inputs: &[String],
            _model_id: &str,
        ) -> Result<Vec<Vec<f32>>, ServiceError> {
            Ok(inputs.iter().map(|s| vec![s.len() as f32]).collect())
        }
    }

    fn service(provider: FlakyProvider, timeout: Duration, retries: u32) -> LlmService {
        let mut settings = Settings::default();
        settings.openai.primary_model = "primary".into();
        LlmService::new(
            Arc::new(provider),
            LlmModels::from_settings(&settings),
            timeout,
            RetryPolicy::new(retries, Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn chat_retries_transient_failures() {
        let svc = service(
            FlakyProvider {
                failures_before_success: 2,
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            },
            Duration::from_secs(5),
            2,
        );

        let reply = svc.chat_primary(vec![ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(reply, "primary:1");
    }

    #[tokio::test]
    async fn chat_times_out_per_call() {
        let svc = service(
            FlakyProvider {
                failures_before_success: 0,
                calls: AtomicU32::new(0),
                delay: Duration::from_millis(200),
            },
            Duration::from_millis(10),
            1,
        );

        let err = svc
            .chat_primary(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Timeout { .. }));
    }

    #[tokio::test]
    async fn embed_one_returns_single_vector() {
        let svc = service(
            FlakyProvider {
                failures_before_success: 0,
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            },
            Duration::from_secs(1),
            0,
        );
        assert_eq!(svc.embed_one("abcd").await.unwrap(), vec![4.0]);
    }
}
