//! Retrieve, assemble, generate: the request path for one question.
//!
//! Embedding and generation failures never escape as errors. They become a
//! degraded [`Answer`] carrying the fallback text and the reason, so callers
//! can tell a real answer from a fallback by [`Answer::success`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ragline_llm::{FailureReason, GenerationFailure, Generator};
use ragline_memory::{ChunkId, MemoryError};
use serde::{Serialize, Serializer};
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::context::{AssembledPrompt, ContextAssembler};
use crate::retriever::{RetrievalError, Retriever};

const FALLBACK_PREFIX: &str = "[fallback] RAG pipeline response for: ";

/// Text returned in place of a generated answer.
#[must_use]
pub fn fallback_text(question: &str) -> String {
    format!("{FALLBACK_PREFIX}{question}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    /// The question could not be embedded; generation was not attempted.
    Embedding,
    Generation(FailureReason),
    /// No generation slot became free within the admission timeout.
    Overloaded,
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedding => f.write_str("embedding"),
            Self::Generation(reason) => write!(f, "generation:{reason}"),
            Self::Overloaded => f.write_str("overloaded"),
        }
    }
}

impl Serialize for DegradedReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Chunks used as context, in prompt order.
    pub sources: Vec<ChunkId>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<DegradedReason>,
}

impl Answer {
    fn degraded(question: &str, sources: Vec<ChunkId>, reason: DegradedReason) -> Self {
        Self {
            text: fallback_text(question),
            sources,
            success: false,
            degraded_reason: Some(reason),
        }
    }
}

/// Faults that are not a degraded answer.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("index entry {0} does not resolve to a stored chunk")]
    Corrupted(ChunkId),

    #[error("index error: {0}")]
    Index(#[from] MemoryError),
}

#[derive(Debug, Clone)]
pub struct PipelinePolicy {
    pub top_k: usize,
    pub max_context_tokens: usize,
    /// Per-attempt generation deadline.
    pub generation_timeout: Duration,
    /// Extra attempts after a retryable failure.
    pub max_retries: u32,
    /// First retry delay; doubles on each further retry.
    pub retry_backoff: Duration,
    pub max_in_flight: usize,
    pub admission_timeout: Duration,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            top_k: 4,
            max_context_tokens: 2048,
            generation_timeout: Duration::from_secs(5),
            max_retries: 1,
            retry_backoff: Duration::from_millis(200),
            max_in_flight: 8,
            admission_timeout: Duration::from_secs(2),
        }
    }
}

impl PipelinePolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_context_tokens: config.context.max_tokens,
            generation_timeout: config.generation.timeout(),
            max_retries: config.generation.max_retries,
            retry_backoff: Duration::from_millis(config.generation.retry_backoff_ms),
            max_in_flight: config.generation.max_in_flight,
            admission_timeout: Duration::from_millis(config.generation.admission_timeout_ms),
        }
    }
}

pub struct Pipeline {
    retriever: Retriever,
    assembler: ContextAssembler,
    generator: Arc<dyn Generator>,
    policy: PipelinePolicy,
    permits: Semaphore,
}

impl Pipeline {
    #[must_use]
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>, policy: PipelinePolicy) -> Self {
        let permits = Semaphore::new(policy.max_in_flight.max(1));
        Self {
            retriever,
            assembler: ContextAssembler::new(),
            generator,
            policy,
            permits,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &PipelinePolicy {
        &self.policy
    }

    /// Answer `question` from the corpus.
    ///
    /// Dropping the returned future cancels the in-flight backend request and
    /// frees its generation slot.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::EmptyQuestion`] for a blank question.
    /// - [`PipelineError::Corrupted`] if the index references a missing chunk.
    /// - [`PipelineError::Index`] if the query vector does not fit the index.
    pub async fn answer(&self, question: &str) -> Result<Answer, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }
        let started = Instant::now();

        let retrieved = match self.retriever.retrieve(question, self.policy.top_k).await {
            Ok(result) => result,
            Err(RetrievalError::Embedding(e)) => {
                tracing::warn!(error = %e, "query embedding failed, answering with fallback");
                return Ok(Answer::degraded(question, Vec::new(), DegradedReason::Embedding));
            }
            Err(RetrievalError::Corrupted(id)) => return Err(PipelineError::Corrupted(id)),
            Err(RetrievalError::Index(e)) => return Err(PipelineError::Index(e)),
        };

        let AssembledPrompt {
            prompt,
            chunk_ids,
            tokens,
        } = self
            .assembler
            .assemble(question, &retrieved, self.policy.max_context_tokens);
        tracing::debug!(
            retrieved = retrieved.len(),
            included = chunk_ids.len(),
            tokens,
            "prompt assembled"
        );

        let Ok(Ok(_permit)) =
            tokio::time::timeout(self.policy.admission_timeout, self.permits.acquire()).await
        else {
            tracing::warn!(
                max_in_flight = self.policy.max_in_flight,
                "no generation slot within admission timeout"
            );
            return Ok(Answer::degraded(question, chunk_ids, DegradedReason::Overloaded));
        };

        match self.generate_with_retry(&prompt).await {
            Ok(text) => {
                tracing::debug!(
                    sources = chunk_ids.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "answer generated"
                );
                Ok(Answer {
                    text,
                    sources: chunk_ids,
                    success: true,
                    degraded_reason: None,
                })
            }
            Err(failure) => {
                tracing::warn!(
                    reason = %failure.reason,
                    detail = %failure.detail,
                    elapsed_ms = started.elapsed().as_millis(),
                    "generation failed, answering with fallback"
                );
                Ok(Answer::degraded(
                    question,
                    chunk_ids,
                    DegradedReason::Generation(failure.reason),
                ))
            }
        }
    }

    async fn generate_with_retry(&self, prompt: &str) -> Result<String, GenerationFailure> {
        let mut attempt = 0u32;
        loop {
            match self
                .generator
                .generate(prompt, self.policy.generation_timeout)
                .await
            {
                Ok(generated) => return Ok(generated.text),
                Err(failure) if failure.reason.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.retry_backoff.saturating_mul(1 << attempt.min(16));
                    tracing::debug!(attempt, reason = %failure.reason, ?delay, "retrying generation");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure),
            }
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("generator", &self.generator.name())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
