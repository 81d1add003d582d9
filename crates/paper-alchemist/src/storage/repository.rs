//! Repository interface the orchestrator writes checkpoints through

use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    DocumentRecord, DocumentSummary, OcrDecision, PaperMetadata, PipelineStatus, ProcessingLogEntry,
    QualityVerdict, Stage,
};

/// Persistence for document records, keyed by `doc_id`
///
/// Every checkpoint method is a single atomic write that only succeeds when
/// the stored status is an allowed predecessor of the target status; a
/// refused write returns `Error::CheckpointRejected` and changes nothing.
/// A successful checkpoint clears `error`.
///
/// Implementations:
/// - `PaperDb`: SQLite
pub trait DocumentRepository: Send + Sync {
    /// Insert a new record in `received` together with its source PDF
    fn create(&self, record: &DocumentRecord, pdf: &[u8]) -> Result<()>;

    fn get(&self, doc_id: Uuid) -> Result<Option<DocumentRecord>>;

    /// Uploaded PDF bytes
    fn source_pdf(&self, doc_id: Uuid) -> Result<Option<Vec<u8>>>;

    /// All documents, newest first
    fn list(&self) -> Result<Vec<DocumentSummary>>;

    /// Number of documents per status
    fn status_counts(&self) -> Result<Vec<(PipelineStatus, usize)>>;

    /// `received | ocr_failed -> ocr_done`
    fn record_ocr(
        &self,
        doc_id: Uuid,
        text: &str,
        ocr_performed: bool,
        decision: OcrDecision,
        preview: Option<&[u8]>,
    ) -> Result<()>;

    /// `ocr_done -> quality_checked`; `ocr_text` replaces `raw_text` when a
    /// deferred OCR ran
    fn record_quality(&self, doc_id: Uuid, verdict: Option<&QualityVerdict>, ocr_text: Option<&str>) -> Result<()>;

    /// `quality_checked | embedding_failed -> embedded`
    ///
    /// Looks up the earliest other document with the same `content_id` in the
    /// same transaction and records the original it stands for (itself, or
    /// what it duplicates) as `duplicate_of`.
    fn record_embedding(&self, doc_id: Uuid, embedding: &[f32], content_id: &str) -> Result<Option<Uuid>>;

    /// `embedded | metadata_failed -> metadata_extracted`
    fn record_metadata(&self, doc_id: Uuid, metadata: &PaperMetadata) -> Result<()>;

    /// `metadata_extracted -> complete`
    fn mark_complete(&self, doc_id: Uuid) -> Result<()>;

    /// Freeze at a `*_failed` status, keeping every persisted output
    fn record_failure(&self, doc_id: Uuid, failed: PipelineStatus, error: &str) -> Result<()>;

    /// Move back to the checkpoint preceding `restart_from`, clearing that
    /// stage's outputs and everything downstream
    ///
    /// When the content id is cleared, records that duplicated this one are
    /// re-pointed at the earliest of them.
    fn rewind(&self, doc_id: Uuid, restart_from: Stage) -> Result<PipelineStatus>;

    /// Documents carrying `content_id`, oldest first
    fn find_by_content_id(&self, content_id: &str) -> Result<Vec<Uuid>>;

    fn append_log(&self, entry: &ProcessingLogEntry) -> Result<()>;

    /// Processing log for one document, oldest first
    fn processing_log(&self, doc_id: Uuid) -> Result<Vec<ProcessingLogEntry>>;
}
