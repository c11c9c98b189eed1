//! SQLite-backed vector store.
//!
//! In-process alternative to Qdrant for local runs and tests: chunk metadata
//! and little-endian `f32` embeddings live in one table, search is a
//! brute-force cosine scan.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::loader::DocumentChunk;
use super::store::{keyword_terms, RetrievedChunk, SearchMode, SearchRequest, VectorStore};
use crate::core::errors::ServiceError;
use crate::tools::vector_math::{cosine_similarity, mmr_select, reciprocal_rank_fusion};

const SERVICE: &str = "sqlite";

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

struct ScoredRow {
    chunk: RetrievedChunk,
    id: String,
    embedding: Vec<f32>,
    score: f32,
}

fn db_err(err: sqlx::Error) -> ServiceError {
    ServiceError::backend(SERVICE, err)
}

impl SqliteVectorStore {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, ServiceError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.ensure_collection().await?;
        Ok(store)
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Every stored chunk scored against the query embedding, best first.
    /// Rows whose dimension differs from the query are skipped.
    async fn scan(&self, query: &[f32]) -> Result<Vec<ScoredRow>, ServiceError> {
        let rows = sqlx::query(
            "SELECT chunk_id, document_id, source, chunk_index, content, embedding
             FROM vector_chunks",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut skipped = 0usize;
        let mut scored: Vec<ScoredRow> = rows
            .iter()
            .filter_map(|row| {
                let bytes: Vec<u8> = row.get("embedding");
                let embedding = Self::deserialize_embedding(&bytes);
                let score = match cosine_similarity(query, &embedding) {
                    Ok(score) => score,
                    Err(_) => {
                        skipped += 1;
                        return None;
                    }
                };
                let chunk_index: i64 = row.get("chunk_index");
                Some(ScoredRow {
                    id: row.get("chunk_id"),
                    chunk: RetrievedChunk {
                        text: row.get("content"),
                        source: row.get("source"),
                        score,
                        document_id: Some(row.get("document_id")),
                        chunk_index: Some(chunk_index.max(0) as usize),
                    },
                    embedding,
                    score,
                })
            })
            .collect();

        if skipped > 0 {
            tracing::warn!(
                "Skipped {} stored chunks with a different embedding dimension",
                skipped
            );
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        Ok(scored)
    }

    fn keyword_ranking(rows: &[ScoredRow], query_text: &str, limit: usize) -> Vec<String> {
        let terms = keyword_terms(query_text);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(&str, usize)> = rows
            .iter()
            .filter_map(|row| {
                let text = row.chunk.text.to_lowercase();
                let count: usize = terms.iter().map(|t| text.matches(t.as_str()).count()).sum();
                (count > 0).then_some((row.id.as_str(), count))
            })
            .collect();
        hits.sort_by(|a, b| b.1.cmp(&a.1));
        hits.into_iter()
            .take(limit)
            .map(|(id, _)| id.to_string())
            .collect()
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn ensure_collection(&self) -> Result<(), ServiceError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_chunks (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                chunk_index INTEGER NOT NULL DEFAULT 0,
                char_offset INTEGER NOT NULL DEFAULT 0,
                token_count INTEGER NOT NULL DEFAULT 0,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vector_chunks_document ON vector_chunks(document_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn upsert(&self, items: &[(DocumentChunk, Vec<f32>)]) -> Result<(), ServiceError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for (chunk, embedding) in items {
            sqlx::query(
                "INSERT OR REPLACE INTO vector_chunks
                    (chunk_id, document_id, source, chunk_index, char_offset, token_count, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&chunk.source_document)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.char_offset as i64)
            .bind(chunk.token_count as i64)
            .bind(&chunk.text)
            .bind(Self::serialize_embedding(embedding))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievedChunk>, ServiceError> {
        let k = request.k.max(1);
        let mut rows = self.scan(&request.embedding).await?;

        match request.mode {
            SearchMode::Similarity => {
                rows.truncate(k);
                Ok(rows.into_iter().map(|row| row.chunk).collect())
            }
            SearchMode::Mmr { lambda, fetch_k } => {
                rows.truncate(fetch_k.max(k));
                let embeddings: Vec<Vec<f32>> =
                    rows.iter().map(|row| row.embedding.clone()).collect();
                let picked = mmr_select(&request.embedding, &embeddings, k, lambda)
                    .map_err(|e| ServiceError::backend(SERVICE, e))?;
                Ok(picked
                    .into_iter()
                    .map(|(idx, relevance)| {
                        let mut chunk = rows[idx].chunk.clone();
                        chunk.score = relevance;
                        chunk
                    })
                    .collect())
            }
            SearchMode::Hybrid { fetch_k } => {
                let limit = fetch_k.max(k);
                let keyword = Self::keyword_ranking(&rows, &request.query_text, limit);
                let dense: Vec<String> = rows.iter().take(limit).map(|r| r.id.clone()).collect();
                let fused = reciprocal_rank_fusion(&[dense, keyword]);

                let mut by_id: HashMap<String, RetrievedChunk> =
                    rows.into_iter().map(|row| (row.id, row.chunk)).collect();
                Ok(fused
                    .into_iter()
                    .filter_map(|(id, score)| {
                        by_id.remove(&id).map(|mut chunk| {
                            chunk.score = score;
                            chunk
                        })
                    })
                    .take(k)
                    .collect())
            }
        }
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, ServiceError> {
        let result = sqlx::query("DELETE FROM vector_chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() as usize)
    }

    async fn count(&self) -> Result<usize, ServiceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as usize)
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
