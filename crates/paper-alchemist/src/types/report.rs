//! Per-attempt reports returned to callers and written to the processing log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{PipelineStatus, Stage};

/// Result of one stage within an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    /// Stage not run (e.g. no preview image for the quality judge)
    Skipped,
    /// Stage failed but the pipeline continued
    SoftFailed,
    /// Stage failed and halted the attempt
    Failed,
}

impl StageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageOutcome::Completed => "completed",
            StageOutcome::Skipped => "skipped",
            StageOutcome::SoftFailed => "soft_failed",
            StageOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => StageOutcome::Completed,
            "skipped" => StageOutcome::Skipped,
            "soft_failed" => StageOutcome::SoftFailed,
            _ => StageOutcome::Failed,
        }
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage execution inside an attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// What a pipeline invocation achieved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub doc_id: Uuid,
    /// Furthest checkpoint reached (failure state if the attempt halted)
    pub status: PipelineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stages executed in this attempt; empty when nothing needed to run
    pub stages: Vec<StageReport>,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn ran(&self, stage: Stage) -> bool {
        self.stages.iter().any(|s| s.stage == stage)
    }
}

/// Persisted processing-log row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingLogEntry {
    pub doc_id: Uuid,
    pub stage: String,
    pub outcome: StageOutcome,
    pub message: Option<String>,
    pub duration_ms: u64,
    pub logged_at: DateTime<Utc>,
}
