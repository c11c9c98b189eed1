use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::config::settings::OpenAiSettings;
use crate::core::errors::ServiceError;

const SERVICE: &str = "openai";

/// OpenAI-compatible chat completions and embeddings over HTTP.
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    client: Client,
    timeout_seconds: u64,
}

impl OpenAiProvider {
    pub fn new(settings: &OpenAiSettings) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| ServiceError::backend(SERVICE, e))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().unwrap_or_default(),
            client,
            timeout_seconds: settings.timeout_seconds,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        read_json(res).await
    }

    fn send_error(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::timeout(SERVICE, self.timeout_seconds)
        } else {
            ServiceError::transport(SERVICE, err)
        }
    }
}

async fn read_json(res: Response) -> Result<Value, ServiceError> {
    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        return Err(ServiceError::Status {
            service: SERVICE.to_string(),
            status: status.as_u16(),
            body: text,
        });
    }
    res.json().await.map_err(|e| ServiceError::decode(SERVICE, e))
}

fn parse_chat_content(payload: &Value) -> Result<String, ServiceError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ServiceError::decode(SERVICE, "missing choices[0].message.content"))
}

fn parse_embeddings(payload: &Value, expected: usize) -> Result<Vec<Vec<f32>>, ServiceError> {
    let data = payload["data"]
        .as_array()
        .ok_or_else(|| ServiceError::decode(SERVICE, "missing data array"))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(pos);
        let values = item["embedding"]
            .as_array()
            .ok_or_else(|| ServiceError::decode(SERVICE, "missing embedding values"))?;
        let vector: Vec<f32> = values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);

    if indexed.len() != expected {
        return Err(ServiceError::decode(
            SERVICE,
            format!("expected {} embeddings, got {}", expected, indexed.len()),
        ));
    }

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ServiceError> {
        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }

        let payload = self.post("/v1/chat/completions", &body).await?;
        parse_chat_content(&payload)
    }

    async fn embed(
        &self,
        inputs: &[String],
        model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ServiceError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let payload = self.post("/v1/embeddings", &body).await?;
        parse_embeddings(&payload, inputs.len())
    }
}
