//! Content identifier derived from an embedding vector
//!
//! The vector is serialized as little-endian IEEE-754 single precision in
//! vector order and hashed with SHA-256. The lowercase hex digest is the
//! document's content id and the only duplicate-detection signal.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Length of a content id in hex characters
pub const CONTENT_ID_LEN: usize = 64;

/// Deterministic digest of `embedding`
///
/// The empty vector hashes the empty byte sequence; callers reject empty
/// embeddings before reaching this point.
pub fn compute_content_id(embedding: &[f32]) -> String {
    let mut hasher = Sha256::new();
    for value in embedding {
        hasher.update(value.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Content id computation bound to the configured embedding dimensionality
#[derive(Debug, Clone, Copy)]
pub struct ContentIdentifier {
    dimensions: usize,
}

impl ContentIdentifier {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Compute the id, rejecting vectors of the wrong length
    pub fn identify(&self, embedding: &[f32]) -> Result<String> {
        if embedding.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }
        Ok(compute_content_id(embedding))
    }
}

/// Whether `s` has the shape of a content id
pub fn is_content_id(s: &str) -> bool {
    s.len() == CONTENT_ID_LEN && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
