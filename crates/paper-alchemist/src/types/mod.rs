//! Core types for the processing pipeline

pub mod document;
pub mod metadata;
pub mod report;
pub mod status;
pub mod verdict;

pub use document::{DocumentRecord, DocumentSummary, OcrDecision};
pub use metadata::{ExtractionMethod, PaperMetadata};
pub use report::{PipelineReport, ProcessingLogEntry, StageOutcome, StageReport};
pub use status::{PipelineStatus, Stage};
pub use verdict::QualityVerdict;
