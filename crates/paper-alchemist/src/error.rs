//! Error types for the paper processing pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::types::PipelineStatus;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied unusable input (empty upload, not a PDF, empty text)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Another invocation is already driving this document
    #[error("Document {0} is already being processed")]
    AlreadyProcessing(String),

    /// OCR engine or text-layer extraction failed
    #[error("OCR error: {0}")]
    Ocr(String),

    /// External model service unavailable or returned an error status
    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    /// External call exceeded its time budget
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// Model response had no usable structure
    #[error("Unusable model response: {0}")]
    Parse(String),

    /// Embedding vector length does not match the configured model
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// SQLite error
    #[error("Database error: {0}")]
    Database(String),

    /// A checkpoint write was refused because the stored status does not allow it
    #[error("Checkpoint {from} -> {to} rejected for document {doc_id}")]
    CheckpointRejected {
        doc_id: String,
        from: PipelineStatus,
        to: PipelineStatus,
    },

    /// Store failed mid-attempt; the document stays at its last confirmed checkpoint
    #[error("Persistence failed for document {doc_id} (last confirmed: {last_confirmed}): {message}")]
    Persistence {
        doc_id: String,
        last_confirmed: PipelineStatus,
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    /// Create an OCR error
    pub fn ocr(message: impl Into<String>) -> Self {
        Self::Ocr(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a retry of the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Provider { .. } | Error::Timeout { .. } | Error::Http(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            Error::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::AlreadyProcessing(_) => (StatusCode::CONFLICT, "already_processing"),
            Error::Ocr(_) => (StatusCode::UNPROCESSABLE_ENTITY, "ocr_error"),
            Error::Provider { .. } => (StatusCode::SERVICE_UNAVAILABLE, "provider_error"),
            Error::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            Error::Parse(_) => (StatusCode::BAD_GATEWAY, "parse_error"),
            Error::DimensionMismatch { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "dimension_mismatch"),
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            Error::CheckpointRejected { .. } => (StatusCode::CONFLICT, "checkpoint_rejected"),
            Error::Persistence { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
