//! Text and vision model traits

use async_trait::async_trait;
use crate::error::Result;

/// Text-completion model used for metadata extraction
///
/// Returns the raw, unvalidated completion; callers parse it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a prompt
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Get model name
    fn model(&self) -> &str;
}

/// Vision-capable model used as the OCR quality judge
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Ask about a PNG image; returns the raw response text
    async fn judge_image(&self, png: &[u8], prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}
