//! Pipeline stages
//!
//! Each stage wraps one external collaborator, applies its `StagePolicy` to
//! every external call, and validates model output before it reaches the
//! data model.

pub mod embedding;
pub mod metadata;
pub mod ocr;
pub mod quality;
pub mod rules;

pub use embedding::EmbeddingStage;
pub use metadata::{parse_metadata, validate_metadata, MetadataStage};
pub use ocr::{OcrOutput, OcrStage};
pub use quality::{parse_verdict, QualityJudgeStage, QualityOutcome};

use serde_json::{Map, Value};

/// Result of validating an untyped model payload
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Structured(T),
    /// Nothing usable could be recovered
    Unparseable,
}

#[cfg(test)]
impl<T> Parsed<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Parsed::Structured(value) => Some(value),
            Parsed::Unparseable => None,
        }
    }
}

/// The first `{` .. last `}` span of a model response parsed as a JSON object
pub(crate) fn json_object_span(raw: &str) -> Option<Map<String, Value>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Non-empty string value, treating placeholder text as absent
pub(crate) fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key) {
        Some(Value::String(s)) => clean_text(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn clean_text(s: &str) -> Option<String> {
    let trimmed = s.trim();
    let lowered = trimmed.to_lowercase();
    if trimmed.is_empty() || matches!(lowered.as_str(), "null" | "none" | "n/a" | "unknown") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_span_ignores_surrounding_prose() {
        let map = json_object_span("Sure! Here it is:\n{\"title\": \"X\"}\nHope this helps.").unwrap();
        assert_eq!(map["title"], "X");
        assert!(json_object_span("no braces here").is_none());
        assert!(json_object_span("} backwards {").is_none());
        assert!(json_object_span("[1, 2]").is_none());
    }

    #[test]
    fn placeholders_are_absent() {
        assert_eq!(clean_text("  N/A "), None);
        assert_eq!(clean_text("null"), None);
        assert_eq!(clean_text(" Nature "), Some("Nature".to_string()));
    }
}
