//! Prompt templates for the vision judge and the metadata model

/// Builds prompts sent to Ollama models
pub struct PromptBuilder;

impl PromptBuilder {
    /// Quality assessment prompt for the first-page preview
    pub fn build_quality_prompt() -> String {
        r#"This image is the first page of a scientific paper. Assess how well OCR would work on it:

1. Text clarity: are the characters sharp and legible?
2. Layout complexity: do multiple columns, tables or figures make OCR harder?
3. Image quality: is the scan resolution and contrast adequate?
4. Language mix: is the page English, Korean, mathematics, or a mix?

Answer with JSON only, in this format:
{
    "text_clarity": "excellent|good|fair|poor",
    "layout_complexity": "simple|moderate|complex|very_complex",
    "image_quality": "excellent|good|fair|poor",
    "language_mix": "english_only|korean_only|mixed|math_heavy",
    "overall_quality": "excellent|good|fair|poor",
    "needs_ocr": true,
    "confidence": 0.85,
    "rationale": "Whether OCR is recommended and why"
}"#
        .to_string()
    }

    /// Metadata extraction prompt over a bounded prefix of the text
    pub fn build_metadata_prompt(text: &str, max_chars: usize) -> String {
        let excerpt = truncate_chars(text, max_chars);

        format!(
            r#"The following is text from a scientific paper. Extract its bibliographic information as JSON.

Paper text:
{excerpt}

Answer with exactly this JSON format:
{{
    "title": "Paper title",
    "authors": ["Author 1", "Author 2"],
    "abstract": "Abstract (summary of at most 200 words)",
    "keywords": ["keyword 1", "keyword 2"],
    "publication_year": 2024,
    "journal": "Journal or venue name",
    "doi": "DOI if present",
    "institution": ["Institution 1", "Institution 2"],
    "language": "en|ko|mixed",
    "paper_type": "research|review|conference|thesis",
    "field": "Research field"
}}

Use null when a field is not clearly stated. Do not guess."#
        )
    }
}

/// Prefix of at most `max_chars` characters, never splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_prompt_is_bounded() {
        let text = "가".repeat(5000);
        let prompt = PromptBuilder::build_metadata_prompt(&text, 3000);
        assert_eq!(prompt.matches('가').count(), 3000);
        assert!(prompt.contains("\"publication_year\": 2024"));
    }

    #[test]
    fn truncate_short_text_is_identity() {
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
    }
}
