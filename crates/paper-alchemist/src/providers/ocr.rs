//! OCR engine trait and the poppler/tesseract implementation

use async_trait::async_trait;

use crate::config::OcrConfig;
use crate::error::{Error, Result};
use crate::ingestion::{page_count, pdf_tools};

/// Text layer extraction, page rendering and OCR for PDF bytes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Number of pages; fails for PDFs that cannot be parsed
    async fn page_count(&self, pdf: &[u8]) -> Result<u32>;

    /// Embedded text, possibly empty
    async fn extract_text_layer(&self, pdf: &[u8]) -> Result<String>;

    /// First page as PNG
    async fn render_first_page(&self, pdf: &[u8]) -> Result<Vec<u8>>;

    /// Full optical character recognition
    async fn ocr(&self, pdf: &[u8]) -> Result<String>;
}

/// OCR via poppler-utils and tesseract child processes
pub struct PopplerOcrEngine {
    languages: String,
    ocr_dpi: u32,
    preview_dpi: u32,
}

impl PopplerOcrEngine {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            languages: config.languages.clone(),
            ocr_dpi: config.ocr_dpi,
            preview_dpi: config.preview_dpi,
        }
    }

    /// Whether the external tools needed for OCR are installed
    pub fn tools_available() -> bool {
        pdf_tools::has_pdftoppm() && pdf_tools::has_tesseract()
    }
}

#[async_trait]
impl OcrEngine for PopplerOcrEngine {
    async fn page_count(&self, pdf: &[u8]) -> Result<u32> {
        let data = pdf.to_vec();
        tokio::task::spawn_blocking(move || page_count(&data))
            .await
            .map_err(|e| Error::internal(format!("Page count task panicked: {}", e)))?
    }

    async fn extract_text_layer(&self, pdf: &[u8]) -> Result<String> {
        pdf_tools::extract_text_layer(pdf.to_vec()).await
    }

    async fn render_first_page(&self, pdf: &[u8]) -> Result<Vec<u8>> {
        pdf_tools::render_first_page(pdf, self.preview_dpi).await
    }

    async fn ocr(&self, pdf: &[u8]) -> Result<String> {
        pdf_tools::ocr_pdf(pdf, self.ocr_dpi, &self.languages).await
    }
}
