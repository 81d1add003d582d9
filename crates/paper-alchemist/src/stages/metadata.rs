//! Metadata stage: LLM extraction over a bounded text prefix
//!
//! Partial records are success. A response with no JSON object, or an object
//! with no recognized non-null field, is a stage failure.

use chrono::Datelike;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::MetadataConfig;
use crate::error::{Error, Result};
use crate::ingestion::{truncate_chars, PromptBuilder};
use crate::processing::StagePolicy;
use crate::providers::LlmProvider;
use crate::types::{ExtractionMethod, PaperMetadata};

use super::{clean_text, json_object_span, rules, string_field, Parsed};

const MAX_TITLE_CHARS: usize = 300;
const MAX_AUTHORS: usize = 20;
const MAX_KEYWORDS: usize = 15;
const MIN_YEAR: i32 = 1900;

pub struct MetadataStage {
    llm: Arc<dyn LlmProvider>,
    config: MetadataConfig,
    policy: StagePolicy,
}

impl MetadataStage {
    pub fn new(llm: Arc<dyn LlmProvider>, config: MetadataConfig, policy: StagePolicy) -> Self {
        Self { llm, config, policy }
    }

    pub async fn extract_metadata(&self, text: &str) -> Result<PaperMetadata> {
        let prompt = PromptBuilder::build_metadata_prompt(text, self.config.max_prompt_chars);

        let raw = self
            .policy
            .run("metadata", || self.llm.complete(&prompt))
            .await?;

        let mut metadata = match parse_metadata(&raw) {
            Parsed::Structured(metadata) => metadata,
            Parsed::Unparseable => {
                return Err(Error::Parse(format!(
                    "No usable metadata in {} response: {:?}",
                    self.llm.model(),
                    truncate_chars(&raw, 200)
                )));
            }
        };

        let current_year = chrono::Utc::now().year();
        metadata.extraction_method = Some(ExtractionMethod::Llm);

        if self.config.rule_based_fill {
            let before = metadata.populated_fields();
            metadata.fill_gaps_from(rules::extract(text, current_year));
            if metadata.populated_fields() > before {
                metadata.extraction_method = Some(ExtractionMethod::LlmWithRules);
            }
        }

        validate_metadata(&mut metadata, current_year);

        tracing::debug!(
            "Extracted {} metadata fields via {}",
            metadata.populated_fields(),
            self.llm.model()
        );
        Ok(metadata)
    }
}

/// Best-effort metadata extraction from an LLM response
pub fn parse_metadata(raw: &str) -> Parsed<PaperMetadata> {
    let Some(map) = json_object_span(raw) else {
        return Parsed::Unparseable;
    };

    let metadata = PaperMetadata {
        title: string_field(&map, &["title"]),
        authors: list_field(&map, &["authors", "author"]),
        year: year_field(&map, &["publication_year", "year"]),
        venue: string_field(&map, &["journal", "venue", "conference"]),
        abstract_text: string_field(&map, &["abstract", "summary"]),
        keywords: list_field(&map, &["keywords", "keyword"]),
        doi: string_field(&map, &["doi", "DOI"]),
        institutions: list_field(&map, &["institution", "institutions", "affiliations"]),
        language: string_field(&map, &["language"]),
        paper_type: string_field(&map, &["paper_type", "type"]),
        field: string_field(&map, &["field", "research_field"]),
        extraction_method: None,
    };

    if metadata.is_empty() {
        Parsed::Unparseable
    } else {
        Parsed::Structured(metadata)
    }
}

/// Enforce size limits and a plausible publication year
pub fn validate_metadata(metadata: &mut PaperMetadata, current_year: i32) {
    if let Some(title) = &metadata.title {
        if title.chars().count() > MAX_TITLE_CHARS {
            let mut truncated: String = title.chars().take(MAX_TITLE_CHARS).collect();
            truncated.push_str("...");
            metadata.title = Some(truncated);
        }
    }

    metadata.authors.truncate(MAX_AUTHORS);
    metadata.keywords.truncate(MAX_KEYWORDS);

    if let Some(year) = metadata.year {
        if !(MIN_YEAR..=current_year + 1).contains(&year) {
            metadata.year = None;
        }
    }
}

/// Array of strings, array of `{name}` objects, or a delimited string
fn list_field(map: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let Some(value) = keys.iter().find_map(|key| map.get(*key)) else {
        return Vec::new();
    };

    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => clean_text(s),
                Value::Object(obj) => string_field(obj, &["name", "full_name"]),
                _ => None,
            })
            .collect(),
        Value::String(s) => s
            .split([',', ';'])
            .flat_map(|part| part.split(" and "))
            .filter_map(clean_text)
            .collect(),
        _ => Vec::new(),
    }
}

fn year_field(map: &Map<String, Value>, keys: &[&str]) -> Option<i32> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            if digits.len() == 4 {
                digits.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockLlmProvider;
    use std::time::Duration;

    #[test]
    fn title_only_is_partial_success() {
        let parsed = parse_metadata(r#"{"title": "On Graphs", "authors": null, "journal": null}"#);
        let metadata = parsed.into_option().unwrap();
        assert_eq!(metadata.title.as_deref(), Some("On Graphs"));
        assert!(metadata.authors.is_empty());
        assert_eq!(metadata.populated_fields(), 1);
    }

    #[test]
    fn accepts_alternate_shapes() {
        let raw = r#"```json
        {
            "title": "Protein Folding at Scale",
            "authors": [{"name": "A. Kim"}, {"name": "B. Lee"}],
            "publication_year": "2023",
            "journal": "Nature",
            "keywords": "proteins; folding, scale",
            "institution": "KAIST",
            "doi": "N/A"
        }
        ```"#;

        let metadata = parse_metadata(raw).into_option().unwrap();
        assert_eq!(metadata.authors, vec!["A. Kim", "B. Lee"]);
        assert_eq!(metadata.year, Some(2023));
        assert_eq!(metadata.venue.as_deref(), Some("Nature"));
        assert_eq!(metadata.keywords, vec!["proteins", "folding", "scale"]);
        assert_eq!(metadata.institutions, vec!["KAIST"]);
        assert_eq!(metadata.doi, None);
    }

    #[test]
    fn no_usable_structure_is_unparseable() {
        assert_eq!(parse_metadata("I could not find any metadata."), Parsed::Unparseable);
        assert_eq!(parse_metadata(r#"{"title": null, "authors": []}"#), Parsed::Unparseable);
        assert_eq!(parse_metadata("{ not json }"), Parsed::Unparseable);
    }

    #[test]
    fn validation_limits() {
        let mut metadata = PaperMetadata {
            title: Some("t".repeat(400)),
            authors: (0..30).map(|i| format!("Author {i}")).collect(),
            keywords: (0..20).map(|i| format!("k{i}")).collect(),
            year: Some(2031),
            ..Default::default()
        };
        validate_metadata(&mut metadata, 2026);

        let title = metadata.title.unwrap();
        assert_eq!(title.chars().count(), 303);
        assert!(title.ends_with("..."));
        assert_eq!(metadata.authors.len(), 20);
        assert_eq!(metadata.keywords.len(), 15);
        assert_eq!(metadata.year, None);

        let mut next_year = PaperMetadata { year: Some(2027), ..Default::default() };
        validate_metadata(&mut next_year, 2026);
        assert_eq!(next_year.year, Some(2027));
    }

    fn stage(llm: MockLlmProvider, rule_based_fill: bool) -> MetadataStage {
        let config = MetadataConfig { rule_based_fill, ..Default::default() };
        MetadataStage::new(
            Arc::new(llm),
            config,
            StagePolicy::new(Duration::from_secs(5), 1, Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn gaps_are_filled_from_text() {
        let mut llm = MockLlmProvider::new();
        llm.expect_complete()
            .returning(|_| Ok(r#"{"title": "Sparse Attention", "doi": null}"#.to_string()));
        llm.expect_model().return_const("llama3.1:latest".to_string());

        let text = "Sparse Attention\nDOI: 10.5555/sa.2020.1\nPublished 2020";
        let metadata = stage(llm, true).extract_metadata(text).await.unwrap();

        assert_eq!(metadata.title.as_deref(), Some("Sparse Attention"));
        assert_eq!(metadata.doi.as_deref(), Some("10.5555/sa.2020.1"));
        assert_eq!(metadata.year, Some(2020));
        assert_eq!(metadata.extraction_method, Some(ExtractionMethod::LlmWithRules));
    }

    #[tokio::test]
    async fn rule_fill_can_be_disabled() {
        let mut llm = MockLlmProvider::new();
        llm.expect_complete()
            .returning(|_| Ok(r#"{"title": "Sparse Attention"}"#.to_string()));
        llm.expect_model().return_const("llama3.1:latest".to_string());

        let metadata = stage(llm, false)
            .extract_metadata("Sparse Attention\nPublished 2020")
            .await
            .unwrap();
        assert_eq!(metadata.year, None);
        assert_eq!(metadata.extraction_method, Some(ExtractionMethod::Llm));
    }

    #[tokio::test]
    async fn empty_response_fails_the_stage() {
        let mut llm = MockLlmProvider::new();
        llm.expect_complete().returning(|_| Ok(String::new()));
        llm.expect_model().return_const("llama3.1:latest".to_string());

        assert!(matches!(
            stage(llm, true).extract_metadata("some text").await,
            Err(Error::Parse(_))
        ));
    }

    #[tokio::test]
    async fn prompt_carries_bounded_prefix() {
        let mut llm = MockLlmProvider::new();
        llm.expect_complete()
            .withf(|prompt| prompt.contains("START") && !prompt.contains("TAIL"))
            .returning(|_| Ok(r#"{"title": "Long Paper"}"#.to_string()));
        llm.expect_model().return_const("llama3.1:latest".to_string());

        let text = format!("START {} TAIL", "word ".repeat(2000));
        stage(llm, false).extract_metadata(&text).await.unwrap();
    }
}
