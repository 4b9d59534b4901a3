//! Retrieval-augmented answering: configuration, retriever, context assembly
//! and the pipeline that ties them to a generation backend.

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod pipeline;
pub mod retriever;

pub use bootstrap::App;
pub use config::Config;
pub use context::{AssembledPrompt, ContextAssembler, EstimatedTokens, TokenCounter};
pub use pipeline::{Answer, DegradedReason, Pipeline, PipelineError, PipelinePolicy};
pub use retriever::{RetrievalError, RetrievalResult, RetrievedChunk, Retriever};
