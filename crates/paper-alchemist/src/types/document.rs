//! Document record tracking one uploaded PDF through the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{PaperMetadata, PipelineStatus, QualityVerdict};

/// Outcome of the local OCR-necessity heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrDecision {
    /// Text layer missing or too sparse; OCR runs in the OCR stage
    Required,
    /// Text layer is dense enough to use as-is
    NotNeeded,
    /// Ambiguous; resolved by the quality verdict
    Deferred,
}

impl OcrDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrDecision::Required => "required",
            OcrDecision::NotNeeded => "not_needed",
            OcrDecision::Deferred => "deferred",
        }
    }
}

impl fmt::Display for OcrDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OcrDecision {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "required" => Ok(OcrDecision::Required),
            "not_needed" => Ok(OcrDecision::NotNeeded),
            "deferred" => Ok(OcrDecision::Deferred),
            other => Err(crate::error::Error::Database(format!("Unknown OCR decision '{}'", other))),
        }
    }
}

/// Persisted state of one uploaded PDF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Assigned at ingestion, never reused
    pub doc_id: Uuid,
    /// SHA-256 of the embedding, present once embedded
    pub content_id: Option<String>,
    /// Earlier document sharing `content_id`
    pub duplicate_of: Option<Uuid>,
    pub status: PipelineStatus,
    pub filename: Option<String>,
    pub file_size: u64,
    /// Extracted text; empty until the OCR stage completes
    pub raw_text: String,
    pub ocr_performed: bool,
    pub ocr_decision: Option<OcrDecision>,
    pub quality_verdict: Option<QualityVerdict>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Option<PaperMetadata>,
    /// PNG of the first page
    #[serde(skip)]
    pub preview_image: Option<Vec<u8>>,
    /// Last recorded failure, cleared by the next successful checkpoint
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    /// Fresh record in `received`
    pub fn received(doc_id: Uuid, filename: Option<String>, file_size: u64) -> Self {
        let now = Utc::now();
        Self {
            doc_id,
            content_id: None,
            duplicate_of: None,
            status: PipelineStatus::Received,
            filename,
            file_size,
            raw_text: String::new(),
            ocr_performed: false,
            ocr_decision: None,
            quality_verdict: None,
            embedding: None,
            metadata: None,
            preview_image: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            doc_id: self.doc_id,
            filename: self.filename.clone(),
            status: self.status,
            content_id: self.content_id.clone(),
            duplicate_of: self.duplicate_of,
            title: self.metadata.as_ref().and_then(|m| m.title.clone()),
            ocr_performed: self.ocr_performed,
            embedding_dim: self.embedding.as_ref().map(|e| e.len()),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        }
    }
}

/// Lightweight view used by listings and status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub doc_id: Uuid,
    pub filename: Option<String>,
    pub status: PipelineStatus,
    pub content_id: Option<String>,
    pub duplicate_of: Option<Uuid>,
    pub title: Option<String>,
    pub ocr_performed: bool,
    pub embedding_dim: Option<usize>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
