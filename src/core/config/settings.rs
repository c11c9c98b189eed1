//! Typed view over the merged YAML configuration.
//!
//! Every field has a default so a missing `config.yml` still yields a
//! runnable configuration; only the API credentials are mandatory.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::service::ConfigService;
use super::validation::validate_settings;
use crate::core::errors::ConfigError;
use crate::core::retry::RetryPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub security: SecuritySettings,
    pub environment: EnvironmentSettings,
    pub openai: OpenAiSettings,
    pub vector_database: VectorDatabaseSettings,
    pub retrieval: RetrievalSettings,
    pub reranker: RerankerSettings,
    pub web_search: WebSearchSettings,
    pub data_processing: DataProcessingSettings,
    pub workflow: WorkflowSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub title: String,
    pub version: String,
    pub host: String,
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            title: "Federal Ethics Chatbot API".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub cors_origins: Vec<String>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    pub name: String,
    pub debug: bool,
    pub log_level: String,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            name: "development".to_string(),
            debug: false,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub primary_model: String,
    pub planning_model: String,
    pub embedding_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            primary_model: "gpt-4o".to_string(),
            planning_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDatabaseSettings {
    /// `qdrant` or `sqlite`.
    pub backend: String,
    pub url: String,
    pub api_key: Option<String>,
    pub collection_name: String,
    pub embedding_dimension: usize,
    pub timeout_seconds: u64,
}

impl Default for VectorDatabaseSettings {
    fn default() -> Self {
        Self {
            backend: "qdrant".to_string(),
            url: "http://localhost:6333".to_string(),
            api_key: None,
            collection_name: "federal_ethics_docs".to_string(),
            embedding_dimension: 1536,
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub default_strategy: String,
    /// Candidate pool for MMR, hybrid and rerank. `0` derives it from `top_k`.
    pub fetch_k: usize,
    pub mmr_lambda: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            default_strategy: "similarity".to_string(),
            fetch_k: 0,
            mmr_lambda: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.cohere.com".to_string(),
            model: "rerank-english-v3.0".to_string(),
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_results: usize,
    pub search_depth: String,
    pub include_domains: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.tavily.com".to_string(),
            max_results: 3,
            search_depth: "advanced".to_string(),
            include_domains: vec![
                "oge.gov".to_string(),
                "osg.gov".to_string(),
                "ethics.gov".to_string(),
                "gsa.gov".to_string(),
            ],
            timeout_seconds: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataProcessingSettings {
    pub data_directory: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub tokenizer_path: Option<String>,
    pub max_upload_bytes: usize,
    pub embedding_batch_size: usize,
    pub index_on_startup: bool,
}

impl Default for DataProcessingSettings {
    fn default() -> Self {
        Self {
            data_directory: "data".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            tokenizer_path: None,
            max_upload_bytes: 50 * 1024 * 1024,
            embedding_batch_size: 64,
            index_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_steps: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_backoff_ms: 500,
            max_steps: 20,
        }
    }
}

impl Settings {
    /// Loads, applies environment overrides, validates and checks
    /// credentials. Any failure here should abort startup.
    pub fn load(config: &ConfigService) -> Result<Self, ConfigError> {
        let raw = config.load_config()?;
        let mut settings = Self::from_value(raw)?;
        settings.apply_env_overrides();
        settings.validate()?;
        settings.require_credentials()?;
        Ok(settings)
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = non_empty_env("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(key) = non_empty_env("TAVILY_API_KEY") {
            self.web_search.api_key = Some(key);
        }
        if let Some(key) = non_empty_env("COHERE_API_KEY") {
            self.reranker.api_key = Some(key);
        }
        if let Some(url) = non_empty_env("QDRANT_URL") {
            self.vector_database.url = url;
        }
        if let Some(key) = non_empty_env("QDRANT_API_KEY") {
            self.vector_database.api_key = Some(key);
        }
        if let Some(host) = non_empty_env("HOST") {
            self.api.host = host;
        }
        if let Some(port) = non_empty_env("PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.api.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_settings(self)
    }

    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if is_blank(&self.openai.api_key) {
            return Err(ConfigError::MissingCredential {
                key: "openai.api_key",
                env: "OPENAI_API_KEY",
                path: "openai.api_key",
            });
        }
        if is_blank(&self.web_search.api_key) {
            return Err(ConfigError::MissingCredential {
                key: "web_search.api_key",
                env: "TAVILY_API_KEY",
                path: "web_search.api_key",
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.workflow.max_retries,
            Duration::from_millis(self.workflow.retry_backoff_ms),
        )
    }

    /// Candidate pool size for diversity / fusion / rerank strategies.
    pub fn fetch_k(&self) -> usize {
        if self.retrieval.fetch_k > 0 {
            self.retrieval.fetch_k.max(self.retrieval.top_k)
        } else {
            (self.retrieval.top_k * 4).max(self.retrieval.top_k)
        }
    }

    /// Effective settings as JSON with credentials masked.
    pub fn redacted(&self) -> Value {
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        super::service::redact_sensitive_values(&value)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}
