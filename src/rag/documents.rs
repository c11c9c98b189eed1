//! Document management: upload validation, ingestion into the vector store
//! and the metadata registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use super::loader::{discover_pdfs, extract_pdf_text, is_pdf_bytes, Chunker, ExtractError};
use super::store::VectorStore;
use crate::core::errors::{ApiError, ServiceError};
use crate::llm::LlmService;
use crate::models::documents::{DocumentRecord, DEFAULT_CATEGORY};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("{0}")]
    Validation(String),
    #[error("file exceeds the {limit} byte upload limit")]
    TooLarge { limit: usize },
    #[error("{0}")]
    UnsupportedType(String),
    #[error("document {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for DocumentError {
    fn from(err: sqlx::Error) -> Self {
        DocumentError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for DocumentError {
    fn from(err: std::io::Error) -> Self {
        DocumentError::Storage(err.to_string())
    }
}

impl From<ExtractError> for DocumentError {
    fn from(err: ExtractError) -> Self {
        DocumentError::Validation(err.to_string())
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Validation(msg) => ApiError::BadRequest(msg),
            DocumentError::TooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            DocumentError::UnsupportedType(msg) => ApiError::UnsupportedMediaType(msg),
            DocumentError::NotFound(_) => ApiError::NotFound(err.to_string()),
            DocumentError::Service(e) => e.into(),
            DocumentError::Storage(msg) => ApiError::Internal(msg),
        }
    }
}

/// Outcome of a startup corpus pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub chunks: usize,
}

/// Document metadata persisted next to the vectors.
pub struct DocumentRegistry {
    pool: SqlitePool,
}

impl DocumentRegistry {
    pub async fn with_path(db_path: &Path) -> Result<Self, DocumentError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let registry = Self { pool };
        registry.init_schema().await?;
        Ok(registry)
    }

    async fn init_schema(&self) -> Result<(), DocumentError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                document_id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                upload_timestamp TEXT NOT NULL,
                chunks_count INTEGER NOT NULL,
                category TEXT NOT NULL,
                description TEXT,
                sha256 TEXT NOT NULL,
                file_path TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_sha256 ON documents(sha256)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_record(row: &SqliteRow) -> DocumentRecord {
        let timestamp: String = row.get("upload_timestamp");
        let file_size: i64 = row.get("file_size");
        let chunks_count: i64 = row.get("chunks_count");
        DocumentRecord {
            document_id: row.get("document_id"),
            filename: row.get("filename"),
            file_size: file_size.max(0) as u64,
            upload_timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            chunks_count: chunks_count.max(0) as usize,
            category: row.get("category"),
            description: row.get("description"),
            sha256: row.get("sha256"),
            file_path: row.get("file_path"),
        }
    }

    pub async fn insert(&self, record: &DocumentRecord) -> Result<(), DocumentError> {
        sqlx::query(
            "INSERT INTO documents
                (document_id, filename, file_size, upload_timestamp, chunks_count, category, description, sha256, file_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&record.document_id)
        .bind(&record.filename)
        .bind(record.file_size as i64)
        .bind(record.upload_timestamp.to_rfc3339())
        .bind(record.chunks_count as i64)
        .bind(&record.category)
        .bind(&record.description)
        .bind(&record.sha256)
        .bind(&record.file_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, document_id: &str) -> Result<Option<DocumentRecord>, DocumentError> {
        let row = sqlx::query("SELECT * FROM documents WHERE document_id = ?1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::row_to_record))
    }

    pub async fn find_by_sha256(&self, sha256: &str) -> Result<Option<DocumentRecord>, DocumentError> {
        let row = sqlx::query("SELECT * FROM documents WHERE sha256 = ?1 LIMIT 1")
            .bind(sha256)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::row_to_record))
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<DocumentRecord>, DocumentError> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY upload_timestamp DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    pub async fn remove(&self, document_id: &str) -> Result<bool, DocumentError> {
        let result = sqlx::query("DELETE FROM documents WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Metadata gathered before extraction.
struct PendingDocument {
    document_id: String,
    filename: String,
    file_size: u64,
    sha256: String,
    file_path: String,
    category: String,
    description: Option<String>,
}

pub struct DocumentService {
    registry: DocumentRegistry,
    store: Arc<dyn VectorStore>,
    llm: LlmService,
    chunker: Chunker,
    upload_dir: PathBuf,
    max_upload_bytes: usize,
    embedding_batch_size: usize,
}

impl DocumentService {
    pub fn new(
        registry: DocumentRegistry,
        store: Arc<dyn VectorStore>,
        llm: LlmService,
        chunker: Chunker,
        upload_dir: PathBuf,
        max_upload_bytes: usize,
        embedding_batch_size: usize,
    ) -> Self {
        Self {
            registry,
            store,
            llm,
            chunker,
            upload_dir,
            max_upload_bytes,
            embedding_batch_size: embedding_batch_size.max(1),
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Validates, stores and indexes an uploaded PDF.
    pub async fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        description: Option<String>,
        category: Option<String>,
    ) -> Result<DocumentRecord, DocumentError> {
        let filename = sanitize_filename(filename)?;
        if !filename.to_lowercase().ends_with(".pdf") {
            return Err(DocumentError::UnsupportedType(
                "only PDF files are supported".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(DocumentError::Validation("uploaded file is empty".to_string()));
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(DocumentError::TooLarge {
                limit: self.max_upload_bytes,
            });
        }
        if !is_pdf_bytes(&bytes) {
            return Err(DocumentError::UnsupportedType(
                "file content is not a PDF".to_string(),
            ));
        }

        let document_id = Uuid::new_v4().to_string();
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let file_path = self.upload_dir.join(format!("{}_{}", document_id, filename));
        tokio::fs::write(&file_path, &bytes).await?;

        let category = category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        match self
            .ingest(&document_id, &filename, bytes, &file_path, category, description)
            .await
        {
            Ok(record) => {
                tracing::info!(
                    "Uploaded {} as {} ({} chunks)",
                    record.filename,
                    record.document_id,
                    record.chunks_count
                );
                Ok(record)
            }
            Err(e) => {
                tracing::warn!("Upload of {} failed: {}", filename, e);
                if let Err(rm) = tokio::fs::remove_file(&file_path).await {
                    tracing::warn!("Failed to remove {}: {}", file_path.display(), rm);
                }
                Err(e)
            }
        }
    }

    async fn ingest(
        &self,
        document_id: &str,
        filename: &str,
        bytes: Vec<u8>,
        file_path: &Path,
        category: String,
        description: Option<String>,
    ) -> Result<DocumentRecord, DocumentError> {
        let pending = PendingDocument {
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            file_size: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(&bytes)),
            file_path: file_path.to_string_lossy().into_owned(),
            category,
            description,
        };
        let text = extract_pdf_text(bytes).await?;
        self.index_text(pending, &text).await
    }

    /// Chunks, embeds and registers extracted text. Vectors written before a
    /// failure are rolled back.
    async fn index_text(
        &self,
        pending: PendingDocument,
        text: &str,
    ) -> Result<DocumentRecord, DocumentError> {
        let document_id = pending.document_id.as_str();
        let chunks = self.chunker.split(document_id, &pending.filename, text);
        if chunks.is_empty() {
            return Err(DocumentError::Validation(
                "document contains no extractable text".to_string(),
            ));
        }

        if let Err(e) = self.embed_and_upsert(document_id, &chunks).await {
            self.rollback_vectors(document_id).await;
            return Err(e);
        }

        let record = DocumentRecord {
            document_id: pending.document_id.clone(),
            filename: pending.filename,
            file_size: pending.file_size,
            upload_timestamp: Utc::now(),
            chunks_count: chunks.len(),
            category: pending.category,
            description: pending.description,
            sha256: pending.sha256,
            file_path: pending.file_path,
        };

        if let Err(e) = self.registry.insert(&record).await {
            self.rollback_vectors(&record.document_id).await;
            return Err(e);
        }
        Ok(record)
    }

    /// Best effort; a failure leaves orphan vectors and is logged.
    async fn rollback_vectors(&self, document_id: &str) {
        match self.store.delete_document(document_id).await {
            Ok(removed) => {
                tracing::debug!("Rolled back {} vectors of {}", removed, document_id)
            }
            Err(e) => {
                tracing::warn!("Failed to roll back vectors of {}: {}", document_id, e)
            }
        }
    }

    async fn embed_and_upsert(
        &self,
        document_id: &str,
        chunks: &[super::loader::DocumentChunk],
    ) -> Result<(), DocumentError> {
        for (batch_no, batch) in chunks.chunks(self.embedding_batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.llm.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(ServiceError::decode(
                    self.llm.provider_name(),
                    format!("expected {} embeddings, got {}", batch.len(), vectors.len()),
                )
                .into());
            }

            let items: Vec<_> = batch.iter().cloned().zip(vectors).collect();
            self.store.upsert(&items).await?;
            tracing::debug!(
                "Indexed batch {} of {} ({} chunks)",
                batch_no + 1,
                document_id,
                items.len()
            );
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<DocumentRecord>, DocumentError> {
        self.registry.list().await
    }

    pub async fn get(&self, document_id: &str) -> Result<DocumentRecord, DocumentError> {
        self.registry
            .get(document_id)
            .await?
            .ok_or_else(|| DocumentError::NotFound(document_id.to_string()))
    }

    /// Removes vectors, metadata and, for uploads, the stored file. Returns
    /// the number of vectors removed.
    pub async fn delete(&self, document_id: &str) -> Result<usize, DocumentError> {
        let record = self.get(document_id).await?;

        let removed = self.store.delete_document(document_id).await?;
        if !self.registry.remove(document_id).await? {
            return Err(DocumentError::NotFound(document_id.to_string()));
        }

        let path = PathBuf::from(&record.file_path);
        if path.starts_with(&self.upload_dir) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }

        tracing::info!("Deleted document {} ({} vectors)", document_id, removed);
        Ok(removed)
    }

    /// Indexes every PDF under `dir` whose content is not yet registered.
    pub async fn index_corpus(&self, dir: &Path) -> Result<IndexReport, DocumentError> {
        let mut report = IndexReport::default();
        let files = discover_pdfs(dir);
        if files.is_empty() {
            tracing::info!("No PDF documents found under {}", dir.display());
            return Ok(report);
        }

        self.store.ensure_collection().await?;

        for path in files {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };

            let sha256 = hex::encode(Sha256::digest(&bytes));
            if self.registry.find_by_sha256(&sha256).await?.is_some() {
                report.skipped += 1;
                continue;
            }

            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let document_id = Uuid::new_v4().to_string();

            match self
                .ingest(
                    &document_id,
                    &filename,
                    bytes,
                    &path,
                    DEFAULT_CATEGORY.to_string(),
                    None,
                )
                .await
            {
                Ok(record) => {
                    report.indexed += 1;
                    report.chunks += record.chunks_count;
                    tracing::info!("Indexed {} ({} chunks)", filename, record.chunks_count);
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Failed to index {}: {}", path.display(), e);
                }
            }
        }

        tracing::info!(
            "Corpus indexing finished: {} indexed, {} skipped, {} failed, {} chunks",
            report.indexed,
            report.skipped,
            report.failed,
            report.chunks
        );
        Ok(report)
    }
}

/// Final path component of a client-supplied name.
fn sanitize_filename(name: &str) -> Result<String, DocumentError> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(DocumentError::Validation("filename is required".to_string()));
    }
    Ok(base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/ethics.pdf").unwrap(), "ethics.pdf");
        assert_eq!(sanitize_filename("C:\\docs\\gift.pdf").unwrap(), "gift.pdf");
        assert!(sanitize_filename("  ").is_err());
        assert!(sanitize_filename("dir/").is_err());
    }

    #[test]
    fn errors_map_to_http_statuses() {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        let cases = [
            (DocumentError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (DocumentError::TooLarge { limit: 1 }, StatusCode::PAYLOAD_TOO_LARGE),
            (
                DocumentError::UnsupportedType("x".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (DocumentError::NotFound("d".into()), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn failed_registration_rolls_back_vectors() {
        use crate::graph::testing::{self, ScriptedLlm};
        use crate::llm::{LlmModels, LlmService};
        use crate::rag::tokenizer::ApproxTokenCounter;
        use crate::rag::SqliteVectorStore;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteVectorStore::with_path(dir.path().join("vectors.db"))
                .await
                .unwrap(),
        );
        let registry = DocumentRegistry::with_path(&dir.path().join("docs.db"))
            .await
            .unwrap();
        let settings = testing::settings();
        let llm = LlmService::new(
            Arc::new(ScriptedLlm::default()),
            LlmModels::from_settings(&settings),
            Duration::from_secs(5),
            crate::core::retry::RetryPolicy::new(0, Duration::ZERO),
        );
        let service = DocumentService::new(
            registry,
            store.clone(),
            llm,
            Chunker::new(40, 8, Arc::new(ApproxTokenCounter)),
            dir.path().join("uploads"),
            1024,
            2,
        );
        service.registry.pool.close().await;

        let pending = PendingDocument {
            document_id: "doc-1".into(),
            filename: "gifts.pdf".into(),
            file_size: 10,
            sha256: "abc".into(),
            file_path: "/tmp/gifts.pdf".into(),
            category: DEFAULT_CATEGORY.into(),
            description: None,
        };
        let err = service
            .index_text(
                pending,
                "Gifts of $20 or less are permitted. Gifts from prohibited sources are not.",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentError::Storage(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn registry_round_trip_and_sha_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DocumentRegistry::with_path(&dir.path().join("docs.db"))
            .await
            .unwrap();

        let record = DocumentRecord {
            document_id: "doc-1".into(),
            filename: "standards.pdf".into(),
            file_size: 10,
            upload_timestamp: Utc::now(),
            chunks_count: 3,
            category: DEFAULT_CATEGORY.into(),
            description: Some("Standards of conduct".into()),
            sha256: "abc".into(),
            file_path: "/tmp/standards.pdf".into(),
        };
        registry.insert(&record).await.unwrap();

        let loaded = registry.get("doc-1").await.unwrap().unwrap();
        assert_eq!(loaded.filename, "standards.pdf");
        assert_eq!(loaded.chunks_count, 3);
        assert!(registry.find_by_sha256("abc").await.unwrap().is_some());
        assert_eq!(registry.list().await.unwrap().len(), 1);

        assert!(registry.remove("doc-1").await.unwrap());
        assert!(!registry.remove("doc-1").await.unwrap());
        assert!(registry.get("doc-1").await.unwrap().is_none());
    }
}
