//! OCR quality verdict produced by the vision judge

use serde::{Deserialize, Serialize};

/// Structured judgment of text/OCR quality for a document's first page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    /// Whether the page should go through OCR
    pub needs_ocr: bool,
    /// Model confidence, clamped to [0, 1]
    pub confidence: f32,
    /// Free-text explanation
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_clarity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_complexity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_mix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_quality: Option<String>,
}

impl QualityVerdict {
    pub fn new(needs_ocr: bool, confidence: f32, rationale: impl Into<String>) -> Self {
        Self {
            needs_ocr,
            confidence: clamp_confidence(confidence),
            rationale: rationale.into(),
            text_clarity: None,
            layout_complexity: None,
            image_quality: None,
            language_mix: None,
            overall_quality: None,
        }
    }
}

/// NaN becomes 0
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
