//! Quality judge stage: vision-model assessment of the first-page preview
//!
//! Advisory only. Every failure here degrades to an absent verdict.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::ingestion::{truncate_chars, PromptBuilder};
use crate::processing::StagePolicy;
use crate::providers::VisionModel;
use crate::types::verdict::clamp_confidence;
use crate::types::QualityVerdict;

use super::{json_object_span, string_field, Parsed};

/// Confidence assumed when the model gives other signals but no score
const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Below this confidence a verdict without explicit `needs_ocr` asks for OCR
const LOW_CONFIDENCE: f32 = 0.6;

const MAX_RATIONALE_CHARS: usize = 500;

static CONFIDENCE_KV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)confidence(?:_score)?["']?\s*[:=]\s*["']?([0-9]*\.?[0-9]+)"#).expect("Invalid regex")
});
static NEEDS_OCR_KV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)needs[_ ]ocr["']?\s*[:=]\s*["']?(true|false|yes|no)"#).expect("Invalid regex")
});
static OVERALL_KV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)overall[_ ]quality["']?\s*[:=]\s*["']?(excellent|good|fair|poor|unknown)"#).expect("Invalid regex")
});

/// How the judgment went
#[derive(Debug, Clone, PartialEq)]
pub enum QualityOutcome {
    Judged(QualityVerdict),
    /// Model answered but nothing usable could be parsed
    Unparseable,
    /// Model call failed after retries
    Unavailable(String),
}

pub struct QualityJudgeStage {
    model: Arc<dyn VisionModel>,
    policy: StagePolicy,
}

impl QualityJudgeStage {
    pub fn new(model: Arc<dyn VisionModel>, policy: StagePolicy) -> Self {
        Self { model, policy }
    }

    /// Ask the vision model about the preview; never fails
    pub async fn judge(&self, preview_png: &[u8]) -> QualityOutcome {
        let prompt = PromptBuilder::build_quality_prompt();

        let raw = match self
            .policy
            .run("quality_judge", || self.model.judge_image(preview_png, &prompt))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Quality judge unavailable ({}): {}", self.model.name(), e);
                return QualityOutcome::Unavailable(e.to_string());
            }
        };

        match parse_verdict(&raw) {
            Parsed::Structured(verdict) => QualityOutcome::Judged(verdict),
            Parsed::Unparseable => {
                tracing::warn!(
                    "Unparseable quality verdict: {:?}",
                    truncate_chars(&raw, 200)
                );
                QualityOutcome::Unparseable
            }
        }
    }
}

/// Best-effort verdict extraction from a vision-model response
pub fn parse_verdict(raw: &str) -> Parsed<QualityVerdict> {
    match json_object_span(raw) {
        Some(map) => verdict_from_json(&map),
        None => verdict_from_prose(raw),
    }
}

fn verdict_from_json(map: &Map<String, Value>) -> Parsed<QualityVerdict> {
    let confidence = ["confidence", "confidence_score"]
        .iter()
        .find_map(|key| map.get(*key).and_then(number));
    let needs_ocr = ["needs_ocr", "ocr_recommended"]
        .iter()
        .find_map(|key| map.get(*key).and_then(boolean));
    let overall_quality = string_field(map, &["overall_quality"]).map(|s| s.to_lowercase());

    if confidence.is_none() && needs_ocr.is_none() && overall_quality.is_none() {
        return Parsed::Unparseable;
    }

    let rationale = string_field(map, &["rationale", "recommendations", "reason"]).unwrap_or_default();
    let mut verdict = build(confidence, needs_ocr, overall_quality, rationale);
    verdict.text_clarity = string_field(map, &["text_clarity"]);
    verdict.layout_complexity = string_field(map, &["layout_complexity"]);
    verdict.image_quality = string_field(map, &["image_quality"]);
    verdict.language_mix = string_field(map, &["language_mix"]);
    Parsed::Structured(verdict)
}

fn verdict_from_prose(raw: &str) -> Parsed<QualityVerdict> {
    let confidence = CONFIDENCE_KV
        .captures(raw)
        .and_then(|c| c[1].parse::<f32>().ok());
    let needs_ocr = NEEDS_OCR_KV
        .captures(raw)
        .and_then(|c| parse_bool_word(&c[1]));
    let overall_quality = OVERALL_KV.captures(raw).map(|c| c[1].to_lowercase());

    if confidence.is_none() && needs_ocr.is_none() && overall_quality.is_none() {
        return Parsed::Unparseable;
    }

    let rationale = truncate_chars(raw.trim(), MAX_RATIONALE_CHARS).to_string();
    Parsed::Structured(build(confidence, needs_ocr, overall_quality, rationale))
}

fn build(
    confidence: Option<f32>,
    needs_ocr: Option<bool>,
    overall_quality: Option<String>,
    rationale: String,
) -> QualityVerdict {
    let confidence = clamp_confidence(confidence.unwrap_or(DEFAULT_CONFIDENCE));
    let needs_ocr = needs_ocr.unwrap_or_else(|| {
        matches!(overall_quality.as_deref(), Some("poor") | Some("unknown")) || confidence < LOW_CONFIDENCE
    });

    let mut verdict = QualityVerdict::new(needs_ocr, confidence, rationale);
    verdict.overall_quality = overall_quality;
    verdict
}

fn number(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool_word(s),
        _ => None,
    }
}

fn parse_bool_word(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" => Some(true),
        "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::providers::MockVisionModel;
    use std::time::Duration;

    #[test]
    fn parses_structured_json() {
        let raw = r#"Here is my assessment:
        {
            "text_clarity": "good",
            "layout_complexity": "complex",
            "image_quality": "excellent",
            "language_mix": "mixed",
            "overall_quality": "good",
            "confidence_score": 0.85,
            "recommendations": "Text layer looks clean"
        }"#;

        let verdict = parse_verdict(raw).into_option().unwrap();
        assert!((verdict.confidence - 0.85).abs() < 1e-6);
        assert!(!verdict.needs_ocr);
        assert_eq!(verdict.rationale, "Text layer looks clean");
        assert_eq!(verdict.layout_complexity.as_deref(), Some("complex"));
    }

    #[test]
    fn explicit_needs_ocr_wins_and_confidence_is_clamped() {
        let verdict = parse_verdict(r#"{"needs_ocr": "yes", "confidence": "1.4"}"#)
            .into_option()
            .unwrap();
        assert!(verdict.needs_ocr);
        assert_eq!(verdict.confidence, 1.0);
    }

    #[test]
    fn poor_quality_without_score_defaults() {
        let verdict = parse_verdict(r#"{"overall_quality": "Poor"}"#).into_option().unwrap();
        assert!(verdict.needs_ocr);
        assert_eq!(verdict.confidence, 0.5);
    }

    #[test]
    fn prose_key_values_are_recovered() {
        let verdict = parse_verdict("Overall quality: fair. Confidence: 0.7. needs_ocr: no")
            .into_option()
            .unwrap();
        assert!(!verdict.needs_ocr);
        assert!((verdict.confidence - 0.7).abs() < 1e-6);
        assert_eq!(verdict.overall_quality.as_deref(), Some("fair"));
    }

    #[test]
    fn garbage_is_unparseable() {
        assert_eq!(parse_verdict("I cannot see any image."), Parsed::Unparseable);
        assert_eq!(parse_verdict(r#"{"comment": "nice paper"}"#), Parsed::Unparseable);
        assert_eq!(parse_verdict(""), Parsed::Unparseable);
    }

    fn policy() -> StagePolicy {
        StagePolicy::new(Duration::from_secs(5), 2, Duration::ZERO)
    }

    #[tokio::test]
    async fn unavailable_model_is_soft() {
        let mut model = MockVisionModel::new();
        model
            .expect_judge_image()
            .times(2)
            .returning(|_, _| Err(Error::provider("ollama", "connection refused")));
        model.expect_name().return_const("llava".to_string());

        let outcome = QualityJudgeStage::new(Arc::new(model), policy()).judge(b"png").await;
        assert!(matches!(outcome, QualityOutcome::Unavailable(_)));
    }

    #[tokio::test]
    async fn judged_verdict_is_returned() {
        let mut model = MockVisionModel::new();
        model
            .expect_judge_image()
            .returning(|_, _| Ok(r#"{"needs_ocr": false, "confidence": 0.9, "rationale": "clean"}"#.to_string()));

        let outcome = QualityJudgeStage::new(Arc::new(model), policy()).judge(b"png").await;
        let verdict = match outcome {
            QualityOutcome::Judged(verdict) => verdict,
            other => panic!("expected a verdict, got {:?}", other),
        };
        assert!(!verdict.needs_ocr);
        assert_eq!(verdict.rationale, "clean");
    }
}
