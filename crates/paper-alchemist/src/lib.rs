//! paper-alchemist: scientific PDF processing pipeline
//!
//! Each uploaded PDF is driven through OCR, a vision-model quality judgment,
//! embedding, content-hash deduplication and LLM metadata extraction by a
//! per-document state machine with persisted checkpoints. Results are stored
//! in SQLite and served over a small query API.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod server;
pub mod stages;
pub mod storage;
pub mod types;

pub use config::AlchemistConfig;
pub use error::{Error, Result};
pub use processing::{compute_content_id, Collaborators, Pipeline};
pub use storage::{DocumentRepository, PaperDb};
pub use types::{
    DocumentRecord, DocumentSummary, PaperMetadata, PipelineReport, PipelineStatus, QualityVerdict, Stage,
};
