use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::settings::RerankerSettings;
use crate::core::errors::ServiceError;

/// Cross-encoder reordering of retrieved passages.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// `(index into documents, relevance)` pairs, best first, at most `top_n`.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<(usize, f32)>, ServiceError>;
}

pub struct CohereReranker {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_seconds: u64,
}

impl CohereReranker {
    /// `None` when no API key is configured.
    pub fn from_settings(settings: &RerankerSettings) -> Result<Option<Self>, ServiceError> {
        let Some(api_key) = settings.api_key.clone().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| ServiceError::backend("cohere", e))?;

        Ok(Some(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            timeout_seconds: settings.timeout_seconds,
        }))
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    fn name(&self) -> &str {
        "cohere"
    }

    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<(usize, f32)>, ServiceError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": top_n.min(documents.len()),
        });

        let response = self
            .client
            .post(format!("{}/v2/rerank", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::timeout("cohere", self.timeout_seconds)
                } else {
                    ServiceError::transport("cohere", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                service: "cohere".to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::decode("cohere", e))?;
        parse_rerank_results(&payload, documents.len())
    }
}

fn parse_rerank_results(payload: &Value, total: usize) -> Result<Vec<(usize, f32)>, ServiceError> {
    let results = payload
        .get("results")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ServiceError::decode("cohere", "missing results array"))?;

    let mut ranked = Vec::with_capacity(results.len());
    for item in results {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .ok_or_else(|| ServiceError::decode("cohere", "result without index"))?;
        if index >= total {
            return Err(ServiceError::decode(
                "cohere",
                format!("result index {} out of range", index),
            ));
        }
        let score = item
            .get("relevance_score")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as f32;
        ranked.push((index, score));
    }

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(ranked)
}
