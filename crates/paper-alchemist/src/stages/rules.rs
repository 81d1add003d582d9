//! Rule-based bibliographic extraction used to fill gaps left by the LLM

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::PaperMetadata;

static DOI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:doi:|doi\.org/)\s*(10\.\d{4,9}/[^\s,;]+)").expect("Invalid regex")
});
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("Invalid regex"));
static KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:keywords?|key\s*words?|index terms)\s*[:：—-]\s*([^\n]+)").expect("Invalid regex")
});
static ABSTRACT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:abstract|초록)\b\s*[:：.]?\s*([^\n]+)").expect("Invalid regex")
});

const MAX_KEYWORDS: usize = 10;
const MIN_ABSTRACT_CHARS: usize = 50;
const MAX_ABSTRACT_CHARS: usize = 500;

/// Heuristic metadata from raw text; `current_year` bounds year detection
pub fn extract(text: &str, current_year: i32) -> PaperMetadata {
    PaperMetadata {
        title: title(text),
        year: year(text, current_year),
        abstract_text: abstract_paragraph(text),
        keywords: keywords(text),
        doi: doi(text),
        language: language(text),
        ..Default::default()
    }
}

/// First reasonably sized line among the first five non-empty lines
fn title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(5)
        .find(|line| {
            let n = line.chars().count();
            n > 10 && n < 200
        })
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Latest plausible year mentioned
fn year(text: &str, current_year: i32) -> Option<i32> {
    YEAR.find_iter(text)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .filter(|y| (1900..=current_year).contains(y))
        .max()
}

fn doi(text: &str) -> Option<String> {
    DOI.captures(text)
        .map(|c| c[1].trim_end_matches('.').to_string())
}

fn keywords(text: &str) -> Vec<String> {
    KEYWORDS
        .captures(text)
        .map(|c| {
            c[1].split([',', ';', '·'])
                .map(|k| k.trim().trim_end_matches('.').to_string())
                .filter(|k| !k.is_empty())
                .take(MAX_KEYWORDS)
                .collect()
        })
        .unwrap_or_default()
}

fn abstract_paragraph(text: &str) -> Option<String> {
    let captured = ABSTRACT.captures(text)?;
    let paragraph = captured[1].trim();
    if paragraph.chars().count() < MIN_ABSTRACT_CHARS {
        return None;
    }
    Some(paragraph.chars().take(MAX_ABSTRACT_CHARS).collect())
}

/// `ko`, `en` or `mixed` from the Hangul share of letters
fn language(text: &str) -> Option<String> {
    let hangul = text.chars().filter(|c| ('가'..='힣').contains(c)).count();
    let latin = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
    let total = hangul + latin;
    if total == 0 {
        return None;
    }

    let ratio = hangul as f64 / total as f64;
    let lang = if ratio > 0.7 {
        "ko"
    } else if ratio > 0.3 {
        "mixed"
    } else {
        "en"
    };
    Some(lang.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAPER: &str = "\
Journal of Imaginary Results, Vol. 3
Graph Neural Networks for Catalyst Discovery

Jane Doe, John Roe
Published 2021. Received 2019.

Abstract: We present a graph neural network that predicts adsorption energies for heterogeneous catalysts with high accuracy.
Keywords: graph neural networks; catalysis, materials discovery
DOI: 10.1234/jir.2021.0042.
";

    #[test]
    fn extracts_common_fields() {
        let meta = extract(PAPER, 2026);
        assert_eq!(meta.title.as_deref(), Some("Journal of Imaginary Results, Vol. 3"));
        assert_eq!(meta.year, Some(2021));
        assert_eq!(meta.doi.as_deref(), Some("10.1234/jir.2021.0042"));
        assert_eq!(
            meta.keywords,
            vec!["graph neural networks", "catalysis", "materials discovery"]
        );
        assert!(meta.abstract_text.unwrap().starts_with("We present"));
        assert_eq!(meta.language.as_deref(), Some("en"));
    }

    #[test]
    fn future_years_are_ignored() {
        assert_eq!(year("see 2099 and 1999", 2026), Some(1999));
        assert_eq!(year("no years", 2026), None);
    }

    #[test]
    fn korean_text_is_detected() {
        assert_eq!(language("딥러닝 기반 단백질 구조 예측").as_deref(), Some("ko"));
        assert_eq!(language("12345").as_deref(), None);
    }

    #[test]
    fn short_abstract_is_ignored() {
        assert_eq!(abstract_paragraph("Abstract: too short"), None);
    }
}
