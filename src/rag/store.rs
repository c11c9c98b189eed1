//! VectorStore trait: the seam between retrieval and the vector database.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::loader::DocumentChunk;
use crate::core::errors::ServiceError;

/// How the knowledge base is queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    #[default]
    Similarity,
    Mmr,
    Hybrid,
    Rerank,
}

impl RetrievalStrategy {
    pub const ALL: [RetrievalStrategy; 4] = [
        RetrievalStrategy::Similarity,
        RetrievalStrategy::Mmr,
        RetrievalStrategy::Hybrid,
        RetrievalStrategy::Rerank,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::Similarity => "similarity",
            RetrievalStrategy::Mmr => "mmr",
            RetrievalStrategy::Hybrid => "hybrid",
            RetrievalStrategy::Rerank => "rerank",
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "similarity" | "dense" => Ok(RetrievalStrategy::Similarity),
            "mmr" | "max_marginal_relevance" => Ok(RetrievalStrategy::Mmr),
            "hybrid" => Ok(RetrievalStrategy::Hybrid),
            "rerank" | "cohere_rerank" => Ok(RetrievalStrategy::Rerank),
            other => Err(format!(
                "unknown retrieval strategy {:?} (expected similarity, mmr, hybrid or rerank)",
                other
            )),
        }
    }
}

/// A retrieved chunk, normalized across backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    /// Relevance as reported by the engine (higher = better).
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
}

/// Query mode understood by a vector store. `Rerank` is layered on top of
/// `Similarity` by the retriever and never reaches the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    Similarity,
    Mmr { lambda: f32, fetch_k: usize },
    Hybrid { fetch_k: usize },
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub embedding: Vec<f32>,
    pub query_text: String,
    pub mode: SearchMode,
    pub k: usize,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Create the collection/table and indexes if missing.
    async fn ensure_collection(&self) -> Result<(), ServiceError>;

    /// Insert or replace chunks with their embeddings.
    async fn upsert(&self, items: &[(DocumentChunk, Vec<f32>)]) -> Result<(), ServiceError>;

    /// Results ordered by descending relevance.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievedChunk>, ServiceError>;

    /// Remove every chunk of a document; returns how many were removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize, ServiceError>;

    async fn count(&self) -> Result<usize, ServiceError>;

    async fn health_check(&self) -> bool;
}

const STOPWORDS: [&str; 24] = [
    "about", "after", "also", "been", "before", "being", "could", "does", "from", "have",
    "into", "just", "more", "should", "some", "than", "that", "their", "there", "they",
    "this", "what", "when", "with",
];

/// Keyword terms for the lexical half of hybrid search: lowercase words of
/// four or more characters, stopwords removed, first occurrence order, at
/// most eight.
pub fn keyword_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in query
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() >= 4)
    {
        if STOPWORDS.contains(&word.as_str()) || terms.contains(&word) {
            continue;
        }
        terms.push(word);
        if terms.len() == 8 {
            break;
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parsing_accepts_aliases() {
        assert_eq!("MMR".parse::<RetrievalStrategy>(), Ok(RetrievalStrategy::Mmr));
        assert_eq!(
            "cohere-rerank".parse::<RetrievalStrategy>(),
            Ok(RetrievalStrategy::Rerank)
        );
        assert!("bm25".parse::<RetrievalStrategy>().is_err());
    }

    #[test]
    fn keyword_terms_drop_short_and_stop_words() {
        let terms = keyword_terms("Can I accept a $25 gift from a contractor? Gift rules, gift cards.");
        assert_eq!(terms, vec!["accept", "gift", "contractor", "rules", "cards"]);
    }
}
