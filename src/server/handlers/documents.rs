use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::core::errors::ApiError;
use crate::models::documents::{
    DocumentDeleteResponse, DocumentListResponse, DocumentUploadResponse,
};
use crate::state::AppState;

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("invalid multipart payload: {}", err))
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut description = None;
    let mut category = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("description") => {
                description = non_blank(field.text().await.map_err(multipart_error)?);
            }
            Some("category") => {
                category = non_blank(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("file is required".to_string()))?;
    let record = state
        .documents
        .upload(&filename, bytes, description, category)
        .await?;

    Ok(Json(DocumentUploadResponse {
        success: true,
        message: format!("Document '{}' indexed", record.filename),
        document_id: record.document_id,
        filename: record.filename,
        chunks_created: record.chunks_count,
        file_size: record.file_size,
    }))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = state.documents.list().await?;
    Ok(Json(DocumentListResponse {
        total_count: documents.len(),
        documents,
    }))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.documents.get(&document_id).await?;
    Ok(Json(record))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let chunks_deleted = state.documents.delete(&document_id).await?;
    Ok(Json(DocumentDeleteResponse {
        success: true,
        message: format!("Document {} deleted", document_id),
        document_id,
        chunks_deleted,
    }))
}
