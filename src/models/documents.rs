use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY: &str = "ethics_guidance";

/// Metadata for an indexed source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub filename: String,
    pub file_size: u64,
    pub upload_timestamp: DateTime<Utc>,
    pub chunks_count: usize,
    pub category: String,
    pub description: Option<String>,
    pub sha256: String,
    #[serde(skip_serializing)]
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentUploadResponse {
    pub success: bool,
    pub message: String,
    pub document_id: String,
    pub filename: String,
    pub chunks_created: usize,
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentRecord>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentDeleteResponse {
    pub success: bool,
    pub message: String,
    pub document_id: String,
    pub chunks_deleted: usize,
}
