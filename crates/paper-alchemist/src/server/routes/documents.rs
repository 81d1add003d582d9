//! Read-only document query endpoints

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{
    DocumentRecord, DocumentSummary, PaperMetadata, PipelineStatus, ProcessingLogEntry, QualityVerdict,
};

/// Query parameters for listing documents
#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    /// Only documents in this status
    pub status: Option<String>,
    /// Only documents sharing this content id
    pub content_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentSummary>,
    /// Count before pagination
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct MetadataResponse {
    pub doc_id: Uuid,
    pub status: PipelineStatus,
    pub duplicate_of: Option<Uuid>,
    pub ocr_performed: bool,
    pub metadata: Option<PaperMetadata>,
    pub quality_verdict: Option<QualityVerdict>,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingResponse {
    pub doc_id: Uuid,
    pub content_id: Option<String>,
    pub dimensions: usize,
    pub embedding: Option<Vec<f32>>,
}

/// GET /api/documents
pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<DocumentListResponse>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<PipelineStatus>)
        .transpose()
        .map_err(|_| Error::InvalidInput(format!("Unknown status filter {:?}", query.status)))?;

    let sharing = query
        .content_id
        .as_deref()
        .map(|content_id| state.repository().find_by_content_id(content_id))
        .transpose()?;

    let documents: Vec<DocumentSummary> = state
        .repository()
        .list()?
        .into_iter()
        .filter(|d| status.map_or(true, |s| d.status == s))
        .filter(|d| sharing.as_ref().map_or(true, |ids| ids.contains(&d.doc_id)))
        .collect();

    let total = documents.len();
    let documents = documents
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .collect();

    Ok(Json(DocumentListResponse {
        documents,
        total,
        offset: query.offset,
        limit: query.limit,
    }))
}

/// GET /api/documents/:id/status
pub async fn get_status(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<DocumentSummary>> {
    let record = load(&state, id)?;
    Ok(Json(record.summary()))
}

/// GET /api/documents/:id/metadata
pub async fn get_metadata(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<MetadataResponse>> {
    let record = load(&state, id)?;
    Ok(Json(MetadataResponse {
        doc_id: record.doc_id,
        status: record.status,
        duplicate_of: record.duplicate_of,
        ocr_performed: record.ocr_performed,
        metadata: record.metadata,
        quality_verdict: record.quality_verdict,
    }))
}

/// GET /api/documents/:id/embedding
pub async fn get_embedding(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<EmbeddingResponse>> {
    let record = load(&state, id)?;
    Ok(Json(EmbeddingResponse {
        doc_id: record.doc_id,
        content_id: record.content_id,
        dimensions: record.embedding.as_ref().map_or(0, Vec::len),
        embedding: record.embedding,
    }))
}

/// GET /api/documents/:id/preview
pub async fn get_preview(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    let record = load(&state, id)?;
    let png = record
        .preview_image
        .ok_or_else(|| Error::DocumentNotFound(format!("preview for {}", id)))?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// GET /api/documents/:id/log
pub async fn get_log(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<ProcessingLogEntry>>> {
    load(&state, id)?;
    Ok(Json(state.repository().processing_log(id)?))
}

fn load(state: &AppState, id: Uuid) -> Result<DocumentRecord> {
    state
        .repository()
        .get(id)?
        .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
}
