use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use crate::core::errors::ConfigError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 10] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "access_key",
    "bearer",
    "auth_",
];

const SENSITIVE_WHITELIST: [&str; 4] = ["max_tokens", "token_count", "tokenizer", "tokenizer_path"];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("INTEGRIBOT_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// Public config deep-merged with secrets (secrets win). Missing files
    /// count as empty; malformed YAML is an error.
    pub fn load_config(&self) -> Result<Value, ConfigError> {
        let public_config = load_yaml_file(&self.config_path())?;
        let secrets_config = load_yaml_file(&self.secrets_path())?;
        Ok(deep_merge(&public_config, &secrets_config))
    }
}

fn load_yaml_file(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
    let value: Value = serde_yaml::from_str(&contents)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(ConfigError::Parse(format!(
            "{}: top level must be a mapping",
            path.display()
        ))),
    }
}

pub(crate) fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

pub(crate) fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "openai": { "primary_model": "gpt-4o", "temperature": 0.1 },
            "web_search": { "include_domains": ["oge.gov"] }
        });
        let secrets = json!({
            "openai": { "api_key": "sk-test" },
            "web_search": { "include_domains": ["gsa.gov"] }
        });

        let merged = deep_merge(&base, &secrets);

        assert_eq!(
            merged,
            json!({
                "openai": { "primary_model": "gpt-4o", "temperature": 0.1, "api_key": "sk-test" },
                "web_search": { "include_domains": ["gsa.gov"] }
            })
        );
    }

    #[test]
    fn redact_sensitive_values_replaces_secrets_only() {
        let input = json!({
            "openai": { "api_key": "sk-test", "max_tokens": 2000 },
            "data_processing": { "tokenizer_path": "/models/tokenizer.json" },
            "reranker": [{ "api_key": "co-key" }]
        });

        let redacted = redact_sensitive_values(&input);

        assert_eq!(
            redacted,
            json!({
                "openai": { "api_key": "****", "max_tokens": 2000 },
                "data_processing": { "tokenizer_path": "/models/tokenizer.json" },
                "reranker": [{ "api_key": "****" }]
            })
        );
    }

    #[test]
    fn load_config_merges_secrets_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::from_data_dir(dir.path()));
        fs::write(
            dir.path().join("config.yml"),
            "openai:\n  primary_model: gpt-4o\n",
        )
        .unwrap();
        fs::write(&paths.secrets_path, "openai:\n  api_key: sk-secret\n").unwrap();

        let service = ConfigService::new(paths);
        let config = service.load_config().unwrap();

        assert_eq!(config["openai"]["primary_model"], "gpt-4o");
        assert_eq!(config["openai"]["api_key"], "sk-secret");
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::from_data_dir(dir.path()));
        fs::write(dir.path().join("config.yml"), "openai: [unclosed").unwrap();

        let service = ConfigService::new(paths);
        assert!(matches!(service.load_config(), Err(ConfigError::Parse(_))));
    }
}
