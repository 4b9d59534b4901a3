//! Embedding and text-generation backends.
//!
//! The pipeline talks to two external collaborators: an [`Embedder`] that turns
//! text into fixed-length vectors, and a [`Generator`] that turns an assembled
//! prompt into an answer. Both are object-safe so they can be injected as
//! `Arc<dyn _>` and swapped for mocks in tests.

pub mod embed;
pub mod error;
pub mod generate;
pub mod hash;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;

pub use embed::Embedder;
pub use error::{EmbeddingError, FailureReason, GenerationFailure};
pub use generate::{GeneratedText, GenerationConfig, Generator};
