//! PDF inspection, local tooling and prompt construction

pub mod pdf_analysis;
pub mod pdf_tools;
pub mod prompts;

pub use pdf_analysis::{page_count, validate_upload, PdfAnalysis, PDF_MAGIC};
pub use prompts::{truncate_chars, PromptBuilder};
