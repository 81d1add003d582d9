//! Embedding stage: whitespace normalization, word-window chunking, mean pooling

use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::processing::StagePolicy;
use crate::providers::EmbeddingProvider;

pub struct EmbeddingStage {
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
    chunk_words: usize,
    chunk_overlap: usize,
    policy: StagePolicy,
}

impl EmbeddingStage {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig, policy: StagePolicy) -> Self {
        Self {
            provider,
            dimensions: config.dimensions,
            chunk_words: config.chunk_words.max(1),
            chunk_overlap: config.chunk_overlap,
            policy,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Document vector for `text`
    ///
    /// Empty or whitespace-only text is a usage error. Every vector returned
    /// by the provider is checked against the configured dimensionality.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Err(Error::InvalidInput("Cannot embed empty text".to_string()));
        }

        let chunks = chunk_words(&words, self.chunk_words, self.chunk_overlap);
        tracing::debug!("Embedding {} words in {} chunks", words.len(), chunks.len());

        let mut vectors = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let vector = self
                .policy
                .run("embedding", || self.provider.embed(chunk))
                .await?;
            self.check(&vector)?;
            vectors.push(vector);
        }

        Ok(mean(&vectors, self.dimensions))
    }

    fn check(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::Parse("Embedding contains non-finite values".to_string()));
        }
        Ok(())
    }
}

/// Overlapping word windows joined with single spaces
pub fn chunk_words(words: &[&str], size: usize, overlap: usize) -> Vec<String> {
    if words.len() <= size {
        return vec![words.join(" ")];
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Element-wise mean of equal-length vectors
fn mean(vectors: &[Vec<f32>], dimensions: usize) -> Vec<f32> {
    if vectors.len() == 1 {
        return vectors[0].clone();
    }

    let mut sum = vec![0.0f64; dimensions];
    for vector in vectors {
        for (acc, v) in sum.iter_mut().zip(vector) {
            *acc += f64::from(*v);
        }
    }
    let n = vectors.len() as f64;
    sum.into_iter().map(|s| (s / n) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockEmbeddingProvider;
    use std::time::Duration;

    fn config(dimensions: usize, chunk_words: usize, chunk_overlap: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            model: "test".to_string(),
            dimensions,
            chunk_words,
            chunk_overlap,
        }
    }

    fn policy() -> StagePolicy {
        StagePolicy::new(Duration::from_secs(5), 1, Duration::ZERO)
    }

    #[test]
    fn chunking_overlaps() {
        let words = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];
        let chunks = chunk_words(&words, 4, 1);
        assert_eq!(chunks, vec!["a b c d", "d e f g", "g h i j"]);

        assert_eq!(chunk_words(&words[..3], 4, 1), vec!["a b c"]);
    }

    #[tokio::test]
    async fn long_text_is_mean_pooled() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().returning(|chunk| {
            if chunk.starts_with("one") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![3.0, 2.0])
            }
        });

        let stage = EmbeddingStage::new(Arc::new(provider), &config(2, 3, 0), policy());
        let vector = stage.embed("one two   three\nfour five six").await.unwrap();
        assert_eq!(vector, vec![2.0, 1.0]);
    }

    #[tokio::test]
    async fn empty_text_is_rejected_without_calling_model() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().never();

        let stage = EmbeddingStage::new(Arc::new(provider), &config(2, 512, 50), policy());
        assert!(matches!(stage.embed("  \n\t ").await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().returning(|_| Ok(vec![0.1; 3]));

        let stage = EmbeddingStage::new(Arc::new(provider), &config(4, 512, 50), policy());
        assert!(matches!(
            stage.embed("some text").await,
            Err(Error::DimensionMismatch { expected: 4, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn whitespace_is_collapsed_before_embedding() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed()
            .withf(|text| text.len() == 16 && text.starts_with("alpha beta gamma"))
            .returning(|_| Ok(vec![0.5, 0.5]));

        let stage = EmbeddingStage::new(Arc::new(provider), &config(2, 512, 50), policy());
        stage.embed("  alpha\n\nbeta \t gamma ").await.unwrap();
    }
}
