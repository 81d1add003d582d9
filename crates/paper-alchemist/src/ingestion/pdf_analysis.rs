//! Byte-level PDF inspection used before any external tool runs

use crate::error::{Error, Result};

/// PDF magic header
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Reject uploads that cannot be a PDF before a record is created
pub fn validate_upload(data: &[u8], max_size: usize) -> Result<()> {
    if data.is_empty() {
        return Err(Error::InvalidInput("Empty upload".to_string()));
    }
    if data.len() > max_size {
        return Err(Error::InvalidInput(format!(
            "Upload is {} bytes, limit is {} bytes",
            data.len(),
            max_size
        )));
    }
    if !data.starts_with(PDF_MAGIC) {
        return Err(Error::InvalidInput("Not a PDF (missing %PDF- header)".to_string()));
    }
    Ok(())
}

/// Page count from the parsed document tree
///
/// A PDF lopdf cannot load is treated as corrupt.
pub fn page_count(data: &[u8]) -> Result<u32> {
    let doc = lopdf::Document::load_mem(data)
        .map_err(|e| Error::ocr(format!("Corrupt PDF: {}", e)))?;
    Ok(doc.get_pages().len() as u32)
}

/// Quick structural markers gathered without full parsing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfAnalysis {
    /// PDF is encrypted
    pub is_encrypted: bool,
    /// Likely a scanned document (image-based)
    pub is_scanned: bool,
    /// Estimated page count
    pub estimated_pages: u32,
    /// Number of image references found
    pub image_count: usize,
    /// Number of text stream markers found
    pub text_stream_count: usize,
}

impl PdfAnalysis {
    pub fn analyze(data: &[u8]) -> Self {
        if !data.starts_with(PDF_MAGIC) {
            return Self::default();
        }

        let is_encrypted = count(data, b"/Encrypt") > 0;

        let image_count = count(data, b"/Image ") + count(data, b"/Subtype /Image");

        // BT = Begin Text
        let text_stream_count = count(data, b"BT ") + count(data, b"BT\n") + count(data, b"BT\r");

        let is_scanned = image_count > 0 && (text_stream_count == 0 || image_count > text_stream_count * 3);

        let estimated_pages = (count(data, b"/Type /Page ")
            + count(data, b"/Type /Page\n")
            + count(data, b"/Type /Page\r")
            + count(data, b"/Type /Page/")
            + count(data, b"/Type/Page ")
            + count(data, b"/Type/Page/")
            + count(data, b"/Type/Page\n")) as u32;

        Self {
            is_encrypted,
            is_scanned,
            estimated_pages: estimated_pages.max(1),
            image_count,
            text_stream_count,
        }
    }
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_validation() {
        assert!(matches!(validate_upload(b"", 100), Err(Error::InvalidInput(_))));
        assert!(matches!(validate_upload(b"hello world", 100), Err(Error::InvalidInput(_))));
        assert!(matches!(validate_upload(b"%PDF-1.4 padding", 8), Err(Error::InvalidInput(_))));
        validate_upload(b"%PDF-1.4\n", 100).unwrap();
    }

    #[test]
    fn scanned_pdf_markers() {
        let data = b"%PDF-1.4\n/Type /Page /XObject << /Im0 /Subtype /Image >> /Image ";
        let analysis = PdfAnalysis::analyze(data);
        assert!(analysis.is_scanned);
        assert!(!analysis.is_encrypted);
        assert_eq!(analysis.estimated_pages, 1);
    }

    #[test]
    fn text_pdf_markers() {
        let data = b"%PDF-1.7\n/Type /Page\nBT /F1 12 Tf ET\n/Type /Page\nBT /F1 12 Tf ET\n";
        let analysis = PdfAnalysis::analyze(data);
        assert!(!analysis.is_scanned);
        assert_eq!(analysis.text_stream_count, 2);
        assert_eq!(analysis.estimated_pages, 2);
    }

    #[test]
    fn non_pdf_is_default() {
        assert_eq!(PdfAnalysis::analyze(b"PK\x03\x04"), PdfAnalysis::default());
    }

    #[test]
    fn garbage_after_header_is_corrupt() {
        assert!(matches!(page_count(b"%PDF-1.4 truncated"), Err(Error::Ocr(_))));
    }
}
