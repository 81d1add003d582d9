//! OCR stage: text layer, OCR-necessity decision, OCR, first-page preview

use std::sync::Arc;

use crate::config::OcrConfig;
use crate::error::{Error, Result};
use crate::ingestion::PdfAnalysis;
use crate::processing::StagePolicy;
use crate::providers::OcrEngine;
use crate::types::{OcrDecision, QualityVerdict};

/// What the OCR stage produced for one document
#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub text: String,
    /// Absent when rendering failed
    pub preview: Option<Vec<u8>>,
    pub ocr_performed: bool,
    pub decision: OcrDecision,
}

/// Decide whether OCR is needed from text-layer density
///
/// `pages` comes from the parsed document; when it reports none the byte-level
/// estimate is used. Scan markers of encrypted files are not trusted because
/// their streams are unreadable without decryption.
pub fn decide(chars: usize, pages: u32, analysis: &PdfAnalysis, config: &OcrConfig) -> OcrDecision {
    let pages = if pages == 0 { analysis.estimated_pages } else { pages };
    let per_page = chars / pages.max(1) as usize;
    let looks_scanned = analysis.is_scanned && !analysis.is_encrypted;

    if chars < config.required_below_chars {
        OcrDecision::Required
    } else if looks_scanned && chars < config.sufficient_above_chars {
        OcrDecision::Required
    } else if chars >= config.sufficient_above_chars && per_page >= config.min_chars_per_page {
        OcrDecision::NotNeeded
    } else {
        OcrDecision::Deferred
    }
}

pub struct OcrStage {
    engine: Arc<dyn OcrEngine>,
    config: OcrConfig,
    policy: StagePolicy,
}

impl OcrStage {
    pub fn new(engine: Arc<dyn OcrEngine>, config: OcrConfig, policy: StagePolicy) -> Self {
        Self { engine, config, policy }
    }

    /// Extract text and the preview image from PDF bytes
    ///
    /// Fails for PDFs that cannot be parsed and when a required OCR pass
    /// fails or yields nothing. Preview rendering failure is not fatal.
    pub async fn extract(&self, pdf: &[u8]) -> Result<OcrOutput> {
        let pages = self
            .policy
            .run("ocr.page_count", || self.engine.page_count(pdf))
            .await?;

        let text_layer = match self
            .policy
            .run("ocr.text_layer", || self.engine.extract_text_layer(pdf))
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Text layer extraction failed, treating as empty: {}", e);
                String::new()
            }
        };

        let analysis = PdfAnalysis::analyze(pdf);
        let chars = text_layer.trim().chars().count();
        let decision = decide(chars, pages, &analysis, &self.config);

        tracing::info!(
            "OCR decision: {} ({} chars over {} pages, scanned={}, encrypted={})",
            decision,
            chars,
            pages,
            analysis.is_scanned,
            analysis.is_encrypted
        );

        let preview = match self
            .policy
            .run("ocr.preview", || self.engine.render_first_page(pdf))
            .await
        {
            Ok(png) => Some(png),
            Err(e) => {
                tracing::warn!("Preview rendering failed: {}", e);
                None
            }
        };

        let (text, ocr_performed) = match decision {
            OcrDecision::Required => (self.run_ocr(pdf).await?, true),
            OcrDecision::NotNeeded | OcrDecision::Deferred => (text_layer, false),
        };

        Ok(OcrOutput {
            text,
            preview,
            ocr_performed,
            decision,
        })
    }

    /// Settle a deferred decision using the quality verdict
    ///
    /// Returns OCR text when the verdict asks for OCR confidently enough and
    /// OCR succeeds; `None` keeps the text layer.
    pub async fn resolve_deferred(&self, pdf: &[u8], verdict: Option<&QualityVerdict>) -> Option<String> {
        let verdict = verdict?;
        if !verdict.needs_ocr || verdict.confidence < self.config.deferred_ocr_min_confidence {
            return None;
        }

        match self.run_ocr(pdf).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!("Deferred OCR failed, keeping text layer: {}", e);
                None
            }
        }
    }

    async fn run_ocr(&self, pdf: &[u8]) -> Result<String> {
        let text = self.policy.run("ocr", || self.engine.ocr(pdf)).await?;
        if text.trim().is_empty() {
            return Err(Error::ocr("OCR produced no text"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockOcrEngine;
    use std::time::Duration;

    fn policy() -> StagePolicy {
        StagePolicy::new(Duration::from_secs(5), 1, Duration::ZERO)
    }

    fn stage(engine: MockOcrEngine) -> OcrStage {
        OcrStage::new(Arc::new(engine), OcrConfig::default(), policy())
    }

    fn text_pdf() -> PdfAnalysis {
        PdfAnalysis { estimated_pages: 1, ..Default::default() }
    }

    fn scanned_pdf() -> PdfAnalysis {
        PdfAnalysis { is_scanned: true, image_count: 4, ..text_pdf() }
    }

    #[test]
    fn decision_thresholds() {
        let config = OcrConfig::default();
        assert_eq!(decide(0, 1, &text_pdf(), &config), OcrDecision::Required);
        assert_eq!(decide(49, 1, &text_pdf(), &config), OcrDecision::Required);
        assert_eq!(decide(150, 1, &scanned_pdf(), &config), OcrDecision::Required);
        assert_eq!(decide(150, 1, &text_pdf(), &config), OcrDecision::Deferred);
        assert_eq!(decide(5000, 10, &text_pdf(), &config), OcrDecision::NotNeeded);
        // dense enough overall, but sparse per page
        assert_eq!(decide(500, 10, &text_pdf(), &config), OcrDecision::Deferred);
    }

    #[test]
    fn encrypted_scan_markers_are_ignored() {
        let config = OcrConfig::default();
        let encrypted = PdfAnalysis { is_encrypted: true, ..scanned_pdf() };
        assert_eq!(decide(150, 1, &encrypted, &config), OcrDecision::Deferred);
        assert_eq!(decide(10, 1, &encrypted, &config), OcrDecision::Required);
    }

    #[test]
    fn estimated_pages_stand_in_for_an_empty_page_tree() {
        let config = OcrConfig::default();
        let ten_pages = PdfAnalysis { estimated_pages: 10, ..text_pdf() };
        assert_eq!(decide(5000, 0, &text_pdf(), &config), OcrDecision::NotNeeded);
        assert_eq!(decide(500, 0, &ten_pages, &config), OcrDecision::Deferred);
    }

    #[tokio::test]
    async fn text_bearing_pdf_skips_ocr() {
        let mut engine = MockOcrEngine::new();
        engine.expect_page_count().returning(|_| Ok(1));
        engine
            .expect_extract_text_layer()
            .returning(|_| Ok("Deep learning for protein folding. ".repeat(20)));
        engine.expect_render_first_page().returning(|_| Ok(vec![0x89, b'P', b'N', b'G']));
        engine.expect_ocr().never();

        let out = stage(engine).extract(b"%PDF-1.4").await.unwrap();
        assert!(!out.ocr_performed);
        assert_eq!(out.decision, OcrDecision::NotNeeded);
        assert!(out.text.starts_with("Deep learning"));
        assert!(out.preview.is_some());
    }

    #[tokio::test]
    async fn empty_text_layer_triggers_ocr() {
        let mut engine = MockOcrEngine::new();
        engine.expect_page_count().returning(|_| Ok(2));
        engine.expect_extract_text_layer().returning(|_| Ok(String::new()));
        engine.expect_render_first_page().returning(|_| Ok(vec![1]));
        engine.expect_ocr().times(1).returning(|_| Ok("Recognized text".to_string()));

        let out = stage(engine).extract(b"%PDF-1.4").await.unwrap();
        assert!(out.ocr_performed);
        assert_eq!(out.text, "Recognized text");
    }

    #[tokio::test]
    async fn ocr_failure_fails_the_stage() {
        let mut engine = MockOcrEngine::new();
        engine.expect_page_count().returning(|_| Ok(1));
        engine.expect_extract_text_layer().returning(|_| Ok(String::new()));
        engine.expect_render_first_page().returning(|_| Ok(vec![1]));
        engine.expect_ocr().returning(|_| Err(Error::ocr("tesseract crashed")));

        assert!(matches!(stage(engine).extract(b"%PDF-1.4").await, Err(Error::Ocr(_))));
    }

    #[tokio::test]
    async fn corrupt_pdf_fails_before_extraction() {
        let mut engine = MockOcrEngine::new();
        engine.expect_page_count().returning(|_| Err(Error::ocr("Corrupt PDF")));
        engine.expect_extract_text_layer().never();

        assert!(stage(engine).extract(b"%PDF-garbage").await.is_err());
    }

    #[tokio::test]
    async fn preview_failure_is_soft() {
        let mut engine = MockOcrEngine::new();
        engine.expect_page_count().returning(|_| Ok(1));
        engine.expect_extract_text_layer().returning(|_| Ok("x".repeat(400)));
        engine.expect_render_first_page().returning(|_| Err(Error::ocr("pdftoppm missing")));

        let out = stage(engine).extract(b"%PDF-1.4").await.unwrap();
        assert!(out.preview.is_none());
        assert_eq!(out.text.len(), 400);
    }

    #[tokio::test]
    async fn deferred_resolution_follows_confident_verdict() {
        let mut engine = MockOcrEngine::new();
        engine.expect_ocr().times(1).returning(|_| Ok("OCR text".to_string()));
        let stage = stage(engine);

        let unsure = QualityVerdict::new(true, 0.3, "blurry?");
        assert_eq!(stage.resolve_deferred(b"%PDF-", Some(&unsure)).await, None);

        let clean = QualityVerdict::new(false, 0.9, "crisp");
        assert_eq!(stage.resolve_deferred(b"%PDF-", Some(&clean)).await, None);
        assert_eq!(stage.resolve_deferred(b"%PDF-", None).await, None);

        let poor = QualityVerdict::new(true, 0.8, "poor scan");
        assert_eq!(
            stage.resolve_deferred(b"%PDF-", Some(&poor)).await.as_deref(),
            Some("OCR text")
        );
    }
}
