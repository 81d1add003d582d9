//! External model collaborators
//!
//! Traits:
//! - `OcrEngine`: text layer, preview rendering, OCR
//! - `VisionModel`: quality judge over the preview image
//! - `EmbeddingProvider`: text embeddings
//! - `LlmProvider`: metadata extraction completions
//!
//! Implementations: `PopplerOcrEngine` (local tools) and the Ollama clients.

pub mod embedding;
pub mod llm;
pub mod ocr;
pub mod ollama;

pub use embedding::EmbeddingProvider;
pub use llm::{LlmProvider, VisionModel};
pub use ocr::{OcrEngine, PopplerOcrEngine};
pub use ollama::{GenerateOptions, OllamaClient, OllamaEmbedder, OllamaLlm, OllamaVision};

#[cfg(test)]
pub use embedding::MockEmbeddingProvider;
#[cfg(test)]
pub use llm::{MockLlmProvider, MockVisionModel};
#[cfg(test)]
pub use ocr::MockOcrEngine;
