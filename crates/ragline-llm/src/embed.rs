use std::future::Future;
use std::pin::Pin;

use crate::error::EmbeddingError;

pub type EmbedFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<f32>, EmbeddingError>> + Send + 'a>>;

/// Text embedding function.
///
/// Implementations must be deterministic for identical input and return
/// vectors of one fixed length.
pub trait Embedder: Send + Sync {
    /// Embed `text` into a fixed-length vector.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] if the backend is unreachable, times out, or
    /// produces malformed output.
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a>;

    /// Output dimension, when known without calling the backend.
    fn dimensions(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &str;
}

/// Reject vectors that cannot take part in similarity search.
///
/// # Errors
///
/// Returns [`EmbeddingError::Malformed`] for an empty vector or non-finite components.
pub fn validate_embedding(vector: &[f32]) -> Result<(), EmbeddingError> {
    if vector.is_empty() {
        return Err(EmbeddingError::Malformed("empty vector".into()));
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(EmbeddingError::Malformed(format!(
            "non-finite component at position {pos}"
        )));
    }
    Ok(())
}
