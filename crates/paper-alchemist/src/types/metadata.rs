//! Bibliographic metadata extracted from paper text

use serde::{Deserialize, Serialize};

/// How the metadata record was assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Fields come from the language model only
    Llm,
    /// Language model fields, gaps filled by rule-based extraction
    LlmWithRules,
}

/// Structured bibliographic record; every field may be absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PaperMetadata {
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub doi: Option<String>,
    #[serde(default)]
    pub institutions: Vec<String>,
    pub language: Option<String>,
    pub paper_type: Option<String>,
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_method: Option<ExtractionMethod>,
}

impl PaperMetadata {
    /// Number of populated bibliographic fields
    pub fn populated_fields(&self) -> usize {
        let scalars = [
            &self.title,
            &self.venue,
            &self.abstract_text,
            &self.doi,
            &self.language,
            &self.paper_type,
            &self.field,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count();

        scalars
            + usize::from(self.year.is_some())
            + usize::from(!self.authors.is_empty())
            + usize::from(!self.keywords.is_empty())
            + usize::from(!self.institutions.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.populated_fields() == 0
    }

    /// Fill fields that are still empty from `other`
    pub fn fill_gaps_from(&mut self, other: PaperMetadata) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fn fill_vec<T>(slot: &mut Vec<T>, value: Vec<T>) {
            if slot.is_empty() {
                *slot = value;
            }
        }

        fill(&mut self.title, other.title);
        fill_vec(&mut self.authors, other.authors);
        fill(&mut self.year, other.year);
        fill(&mut self.venue, other.venue);
        fill(&mut self.abstract_text, other.abstract_text);
        fill_vec(&mut self.keywords, other.keywords);
        fill(&mut self.doi, other.doi);
        fill_vec(&mut self.institutions, other.institutions);
        fill(&mut self.language, other.language);
        fill(&mut self.paper_type, other.paper_type);
        fill(&mut self.field, other.field);
    }
}
