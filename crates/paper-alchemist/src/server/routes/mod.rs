//! API routes

pub mod documents;
pub mod process;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};

use crate::server::state::AppState;

/// Headroom over the upload limit for multipart framing
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/process",
            post(process::process_upload)
                .layer(DefaultBodyLimit::max(max_upload_size.saturating_add(MULTIPART_OVERHEAD))),
        )
        .route("/documents", get(documents::list_documents))
        .route("/documents/:id/process", post(process::process_document))
        .route("/documents/:id/status", get(documents::get_status))
        .route("/documents/:id/metadata", get(documents::get_metadata))
        .route("/documents/:id/embedding", get(documents::get_embedding))
        .route("/documents/:id/preview", get(documents::get_preview))
        .route("/documents/:id/log", get(documents::get_log))
        .route("/info", get(info))
}

/// API info endpoint
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.config();
    Json(serde_json::json!({
        "name": "paper-alchemist",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Scientific PDF pipeline: OCR, quality judgment, embeddings, deduplication, metadata",
        "models": {
            "vision": config.vision.model,
            "embedding": config.embeddings.model,
            "embedding_dimensions": config.embeddings.dimensions,
            "metadata": config.metadata.model,
        },
        "endpoints": {
            "POST /api/process": "Upload a PDF (multipart field 'file') and process it",
            "POST /api/documents/:id/process": "Resume, or rerun from {\"restart_from\": stage}",
            "GET /api/documents": "List documents (?status=&content_id=&limit=&offset=)",
            "GET /api/documents/:id/status": "Pipeline status",
            "GET /api/documents/:id/metadata": "Bibliographic metadata and quality verdict",
            "GET /api/documents/:id/embedding": "Embedding vector and content id",
            "GET /api/documents/:id/preview": "First-page preview (PNG)",
            "GET /api/documents/:id/log": "Processing log"
        }
    }))
}
