//! Pipeline state machine vocabulary
//!
//! `PipelineStatus` is the single source of truth for what has run for a
//! document and where a later invocation resumes. Success states advance
//! strictly in order; each failure state sits beside the stage that produced it.
//!
//! ```text
//! received ─▶ ocr_done ─▶ quality_checked ─▶ embedded ─▶ metadata_extracted ─▶ complete
//!    │                          │                │
//!    ▼                          ▼                ▼
//! ocr_failed            embedding_failed   metadata_failed
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Persisted pipeline status of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Received,
    OcrDone,
    QualityChecked,
    Embedded,
    MetadataExtracted,
    Complete,
    OcrFailed,
    EmbeddingFailed,
    MetadataFailed,
}

impl PipelineStatus {
    pub const ALL: [PipelineStatus; 9] = [
        PipelineStatus::Received,
        PipelineStatus::OcrDone,
        PipelineStatus::QualityChecked,
        PipelineStatus::Embedded,
        PipelineStatus::MetadataExtracted,
        PipelineStatus::Complete,
        PipelineStatus::OcrFailed,
        PipelineStatus::EmbeddingFailed,
        PipelineStatus::MetadataFailed,
    ];

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Received => "received",
            PipelineStatus::OcrDone => "ocr_done",
            PipelineStatus::QualityChecked => "quality_checked",
            PipelineStatus::Embedded => "embedded",
            PipelineStatus::MetadataExtracted => "metadata_extracted",
            PipelineStatus::Complete => "complete",
            PipelineStatus::OcrFailed => "ocr_failed",
            PipelineStatus::EmbeddingFailed => "embedding_failed",
            PipelineStatus::MetadataFailed => "metadata_failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            PipelineStatus::OcrFailed | PipelineStatus::EmbeddingFailed | PipelineStatus::MetadataFailed
        )
    }

    /// Stage a new invocation starts with, `None` once complete
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            PipelineStatus::Received | PipelineStatus::OcrFailed => Some(Stage::Ocr),
            PipelineStatus::OcrDone => Some(Stage::QualityJudge),
            PipelineStatus::QualityChecked | PipelineStatus::EmbeddingFailed => Some(Stage::Embedding),
            PipelineStatus::Embedded | PipelineStatus::MetadataFailed => Some(Stage::Metadata),
            PipelineStatus::MetadataExtracted => Some(Stage::Finalize),
            PipelineStatus::Complete => None,
        }
    }

    /// Number of success checkpoints confirmed; failure states count what preceded them
    pub fn progress(&self) -> u8 {
        match self {
            PipelineStatus::Received | PipelineStatus::OcrFailed => 0,
            PipelineStatus::OcrDone => 1,
            PipelineStatus::QualityChecked | PipelineStatus::EmbeddingFailed => 2,
            PipelineStatus::Embedded | PipelineStatus::MetadataFailed => 3,
            PipelineStatus::MetadataExtracted => 4,
            PipelineStatus::Complete => 5,
        }
    }

    /// Statuses from which a checkpoint write to `self` is accepted
    pub fn allowed_predecessors(&self) -> &'static [PipelineStatus] {
        use PipelineStatus::*;
        match self {
            Received => &[],
            OcrDone | OcrFailed => &[Received, OcrFailed],
            QualityChecked => &[OcrDone],
            Embedded | EmbeddingFailed => &[QualityChecked, EmbeddingFailed],
            MetadataExtracted | MetadataFailed => &[Embedded, MetadataFailed],
            Complete => &[MetadataExtracted],
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PipelineStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| crate::error::Error::Database(format!("Unknown pipeline status '{}'", s)))
    }
}

/// One discrete processing step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ocr,
    QualityJudge,
    Embedding,
    Metadata,
    /// Final persistence after metadata extraction
    Finalize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ocr => "ocr",
            Stage::QualityJudge => "quality_judge",
            Stage::Embedding => "embedding",
            Stage::Metadata => "metadata",
            Stage::Finalize => "finalize",
        }
    }

    /// Status written when the stage succeeds
    pub fn success_status(&self) -> PipelineStatus {
        match self {
            Stage::Ocr => PipelineStatus::OcrDone,
            Stage::QualityJudge => PipelineStatus::QualityChecked,
            Stage::Embedding => PipelineStatus::Embedded,
            Stage::Metadata => PipelineStatus::MetadataExtracted,
            Stage::Finalize => PipelineStatus::Complete,
        }
    }

    /// Status written when the stage fails; the quality judge never halts
    pub fn failure_status(&self) -> Option<PipelineStatus> {
        match self {
            Stage::Ocr => Some(PipelineStatus::OcrFailed),
            Stage::Embedding => Some(PipelineStatus::EmbeddingFailed),
            Stage::Metadata => Some(PipelineStatus::MetadataFailed),
            Stage::QualityJudge | Stage::Finalize => None,
        }
    }

    /// Status a document is rewound to when reprocessing restarts at this stage
    pub fn rewind_status(&self) -> PipelineStatus {
        match self {
            Stage::Ocr => PipelineStatus::Received,
            Stage::QualityJudge => PipelineStatus::OcrDone,
            Stage::Embedding => PipelineStatus::QualityChecked,
            Stage::Metadata => PipelineStatus::Embedded,
            Stage::Finalize => PipelineStatus::MetadataExtracted,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ocr" => Ok(Stage::Ocr),
            "quality" | "quality_judge" => Ok(Stage::QualityJudge),
            "embedding" | "embed" => Ok(Stage::Embedding),
            "metadata" => Ok(Stage::Metadata),
            "finalize" => Ok(Stage::Finalize),
            other => Err(crate::error::Error::InvalidInput(format!("Unknown stage '{}'", other))),
        }
    }
}
