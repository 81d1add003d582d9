//! Ingestion and reprocessing endpoints

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{PipelineReport, Stage};

/// Body of a reprocessing request
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessRequest {
    /// Rewind and rerun from this stage; absent resumes from the stored status
    #[serde(default)]
    pub restart_from: Option<Stage>,
}

/// POST /api/process - upload one PDF in the `file` field and process it
pub async fn process_upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<PipelineReport>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidInput(format!("Failed to read file: {}", e)))?;

        tracing::info!(
            "Upload received: {} ({} bytes)",
            filename.as_deref().unwrap_or("unnamed"),
            data.len()
        );

        let report = state.pipeline().ingest(&data, filename).await?;
        return Ok(Json(report));
    }

    Err(Error::InvalidInput("Missing multipart field 'file'".to_string()))
}

/// POST /api/documents/:id/process - resume, or rerun from a given stage
pub async fn process_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<PipelineReport>> {
    let request = parse_process_request(&body)?;

    let report = match request.restart_from {
        Some(stage) => state.pipeline().reprocess(id, stage).await?,
        None => state.pipeline().process(id).await?,
    };

    Ok(Json(report))
}

/// An empty body resumes; anything else must be a valid request
fn parse_process_request(body: &[u8]) -> Result<ProcessRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProcessRequest::default());
    }

    serde_json::from_slice(body).map_err(|e| Error::InvalidInput(format!("Invalid process request: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_resumes() {
        assert!(parse_process_request(b"").unwrap().restart_from.is_none());
        assert!(parse_process_request(b" \n").unwrap().restart_from.is_none());
        assert!(parse_process_request(b"{}").unwrap().restart_from.is_none());
    }

    #[test]
    fn stage_names_are_parsed() {
        let request = parse_process_request(br#"{"restart_from": "embedding"}"#).unwrap();
        assert_eq!(request.restart_from, Some(Stage::Embedding));
    }

    #[test]
    fn misspelled_stage_is_invalid_input() {
        let err = parse_process_request(br#"{"restart_from": "metdata"}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(matches!(parse_process_request(b"not json"), Err(Error::InvalidInput(_))));
        assert!(matches!(
            parse_process_request(br#"{"restart": "metadata"}"#),
            Err(Error::InvalidInput(_))
        ));
    }
}
