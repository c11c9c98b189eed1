use super::settings::Settings;
use crate::core::errors::ConfigError;
use crate::rag::RetrievalStrategy;

const VECTOR_BACKENDS: [&str; 2] = ["qdrant", "sqlite"];
const SEARCH_DEPTHS: [&str; 2] = ["basic", "advanced"];

pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    validate_non_empty("api.host", &settings.api.host)?;

    validate_non_empty("openai.base_url", &settings.openai.base_url)?;
    validate_non_empty("openai.primary_model", &settings.openai.primary_model)?;
    validate_non_empty("openai.planning_model", &settings.openai.planning_model)?;
    validate_non_empty("openai.embedding_model", &settings.openai.embedding_model)?;
    validate_f64_range("openai.temperature", settings.openai.temperature, 0.0, 2.0)?;
    validate_u64_range("openai.max_tokens", settings.openai.max_tokens as u64, 1, 128_000)?;
    validate_u64_range("openai.timeout_seconds", settings.openai.timeout_seconds, 1, 600)?;

    let db = &settings.vector_database;
    validate_one_of("vector_database.backend", &db.backend, &VECTOR_BACKENDS)?;
    validate_non_empty("vector_database.collection_name", &db.collection_name)?;
    validate_u64_range(
        "vector_database.embedding_dimension",
        db.embedding_dimension as u64,
        1,
        65_536,
    )?;
    validate_u64_range("vector_database.timeout_seconds", db.timeout_seconds, 1, 600)?;
    if db.backend == "qdrant" {
        validate_non_empty("vector_database.url", &db.url)?;
    }

    let retrieval = &settings.retrieval;
    validate_u64_range("retrieval.top_k", retrieval.top_k as u64, 1, 100)?;
    validate_f64_range("retrieval.mmr_lambda", retrieval.mmr_lambda as f64, 0.0, 1.0)?;
    retrieval
        .default_strategy
        .parse::<RetrievalStrategy>()
        .map_err(|e| ConfigError::invalid("retrieval.default_strategy", e))?;

    validate_u64_range(
        "reranker.timeout_seconds",
        settings.reranker.timeout_seconds,
        1,
        600,
    )?;

    let search = &settings.web_search;
    validate_u64_range("web_search.max_results", search.max_results as u64, 1, 20)?;
    validate_one_of("web_search.search_depth", &search.search_depth, &SEARCH_DEPTHS)?;
    validate_u64_range("web_search.timeout_seconds", search.timeout_seconds, 1, 600)?;
    if search.include_domains.iter().any(|d| d.trim().is_empty()) {
        return Err(ConfigError::invalid(
            "web_search.include_domains",
            "domains must not be empty strings",
        ));
    }

    let data = &settings.data_processing;
    validate_u64_range("data_processing.chunk_size", data.chunk_size as u64, 1, 100_000)?;
    if data.chunk_overlap >= data.chunk_size {
        return Err(ConfigError::invalid(
            "data_processing.chunk_overlap",
            format!(
                "must be smaller than chunk_size ({} >= {})",
                data.chunk_overlap, data.chunk_size
            ),
        ));
    }
    validate_u64_range(
        "data_processing.max_upload_bytes",
        data.max_upload_bytes as u64,
        1,
        1_000_000_000,
    )?;
    validate_u64_range(
        "data_processing.embedding_batch_size",
        data.embedding_batch_size as u64,
        1,
        2048,
    )?;

    validate_u64_range("workflow.max_retries", settings.workflow.max_retries as u64, 0, 10)?;
    validate_u64_range("workflow.max_steps", settings.workflow.max_steps as u64, 1, 1000)?;

    Ok(())
}

fn validate_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    Ok(())
}

fn validate_one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), ConfigError> {
    if !allowed.contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("expected one of {:?}, got {:?}", allowed, value),
        ));
    }
    Ok(())
}

fn validate_u64_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::invalid(
            field,
            format!("must be between {} and {} (got {})", min, max, value),
        ));
    }
    Ok(())
}

fn validate_f64_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::invalid(
            field,
            format!("must be between {} and {} (got {})", min, max, value),
        ));
    }
    Ok(())
}
