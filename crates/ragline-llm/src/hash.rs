//! Deterministic local embedder based on feature hashing.
//!
//! Each lowercase alphanumeric token is hashed with BLAKE3 into one of
//! `dimensions` buckets; the bucket counts are L2-normalised. Texts sharing
//! vocabulary end up close under cosine similarity. No network, no model
//! weights, so it doubles as the offline default and the test embedder.

use crate::embed::{EmbedFuture, Embedder};
use crate::error::EmbeddingError;

pub const DEFAULT_DIMENSIONS: usize = 512;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// # Panics
    ///
    /// Panics if `dimensions` is zero.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        assert!(dimensions > 0, "hash embedder needs at least one dimension");
        Self { dimensions }
    }

    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let hash = blake3::hash(token.as_bytes());
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&hash.as_bytes()[..8]);
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (u64::from_le_bytes(prefix) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for HashEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(async move { Ok::<_, EmbeddingError>(self.embed_sync(text)) })
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "hash"
    }
}
