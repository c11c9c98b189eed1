//! Qdrant vector store over its REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};

use super::loader::DocumentChunk;
use super::store::{keyword_terms, RetrievedChunk, SearchMode, SearchRequest, VectorStore};
use crate::core::config::settings::VectorDatabaseSettings;
use crate::core::errors::ServiceError;

const SERVICE: &str = "qdrant";

pub struct QdrantStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    dimension: usize,
    timeout_seconds: u64,
}

impl QdrantStore {
    pub fn new(settings: &VectorDatabaseSettings) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| ServiceError::backend(SERVICE, e))?;

        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
            collection: settings.collection_name.clone(),
            dimension: settings.embedding_dimension,
            timeout_seconds: settings.timeout_seconds,
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.base_url,
            urlencoding::encode(&self.collection),
            suffix
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, ServiceError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::timeout(SERVICE, self.timeout_seconds)
            } else {
                ServiceError::transport(SERVICE, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ServiceError::decode(SERVICE, e))
    }

    async fn collection_exists(&self) -> Result<bool, ServiceError> {
        let response = self
            .request(Method::GET, &self.collection_url(""))
            .send()
            .await
            .map_err(|e| ServiceError::transport(SERVICE, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(ServiceError::Status {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn create_payload_index(&self, field: &str, schema: Value) -> Result<(), ServiceError> {
        let body = json!({ "field_name": field, "field_schema": schema });
        self.send(
            self.request(Method::PUT, &self.collection_url("/index?wait=true"))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    fn document_filter(document_id: &str) -> Value {
        json!({ "must": [{ "key": "document_id", "match": { "value": document_id } }] })
    }
}

/// Query API body for a search request.
fn query_body(request: &SearchRequest) -> Value {
    let k = request.k.max(1);
    match request.mode {
        SearchMode::Similarity => json!({
            "query": request.embedding,
            "limit": k,
            "with_payload": true,
        }),
        SearchMode::Mmr { lambda, fetch_k } => json!({
            "query": {
                "nearest": request.embedding,
                "mmr": {
                    "diversity": (1.0 - lambda).clamp(0.0, 1.0),
                    "candidates_limit": fetch_k.max(k),
                },
            },
            "limit": k,
            "with_payload": true,
        }),
        SearchMode::Hybrid { fetch_k } => {
            let should: Vec<Value> = keyword_terms(&request.query_text)
                .into_iter()
                .map(|term| json!({ "key": "text", "match": { "text": term } }))
                .collect();
            let mut prefetch = vec![json!({
                "query": request.embedding,
                "limit": fetch_k.max(k),
            })];
            if !should.is_empty() {
                prefetch.push(json!({
                    "query": request.embedding,
                    "filter": { "should": should },
                    "limit": fetch_k.max(k),
                }));
            }
            json!({
                "prefetch": prefetch,
                "query": { "fusion": "rrf" },
                "limit": k,
                "with_payload": true,
            })
        }
    }
}

fn parse_points(payload: &Value) -> Vec<RetrievedChunk> {
    let points = payload
        .pointer("/result/points")
        .or_else(|| payload.get("result"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    points
        .iter()
        .filter_map(|point| {
            let body = point.get("payload")?;
            let text = body.get("text").and_then(|v| v.as_str())?.to_string();
            Some(RetrievedChunk {
                text,
                source: body
                    .get("source")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                score: point.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32,
                document_id: body
                    .get("document_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                chunk_index: body
                    .get("chunk_index")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as usize),
            })
        })
        .collect()
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn ensure_collection(&self) -> Result<(), ServiceError> {
        if self.collection_exists().await? {
            tracing::info!("Qdrant collection already exists: {}", self.collection);
            return Ok(());
        }

        let body = json!({ "vectors": { "size": self.dimension, "distance": "Cosine" } });
        self.send(self.request(Method::PUT, &self.collection_url("")).json(&body))
            .await?;
        self.create_payload_index("document_id", json!("keyword"))
            .await?;
        self.create_payload_index(
            "text",
            json!({ "type": "text", "tokenizer": "word", "lowercase": true }),
        )
        .await?;

        tracing::info!(
            "Created Qdrant collection {} ({} dims, cosine)",
            self.collection,
            self.dimension
        );
        Ok(())
    }

    async fn upsert(&self, items: &[(DocumentChunk, Vec<f32>)]) -> Result<(), ServiceError> {
        if items.is_empty() {
            return Ok(());
        }

        let points: Vec<Value> = items
            .iter()
            .map(|(chunk, vector)| {
                json!({
                    "id": chunk.id,
                    "vector": vector,
                    "payload": {
                        "text": chunk.text,
                        "source": chunk.source_document,
                        "document_id": chunk.document_id,
                        "chunk_index": chunk.chunk_index,
                        "char_offset": chunk.char_offset,
                        "token_count": chunk.token_count,
                    },
                })
            })
            .collect();

        self.send(
            self.request(Method::PUT, &self.collection_url("/points?wait=true"))
                .json(&json!({ "points": points })),
        )
        .await?;
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievedChunk>, ServiceError> {
        let payload = self
            .send(
                self.request(Method::POST, &self.collection_url("/points/query"))
                    .json(&query_body(request)),
            )
            .await?;
        Ok(parse_points(&payload))
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, ServiceError> {
        let filter = Self::document_filter(document_id);
        let counted = self
            .send(
                self.request(Method::POST, &self.collection_url("/points/count"))
                    .json(&json!({ "filter": filter, "exact": true })),
            )
            .await?;
        let existing = counted
            .pointer("/result/count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;
        if existing == 0 {
            return Ok(0);
        }

        self.send(
            self.request(Method::POST, &self.collection_url("/points/delete?wait=true"))
                .json(&json!({ "filter": filter })),
        )
        .await?;
        Ok(existing)
    }

    async fn count(&self) -> Result<usize, ServiceError> {
        let payload = self
            .send(
                self.request(Method::POST, &self.collection_url("/points/count"))
                    .json(&json!({ "exact": true })),
            )
            .await?;
        Ok(payload
            .pointer("/result/count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/healthz", self.base_url);
        match self.request(Method::GET, &url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Qdrant health check failed: {}", e);
                false
            }
        }
    }
}
