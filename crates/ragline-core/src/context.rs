//! Deterministic prompt construction from retrieved chunks.

use std::fmt::Write as _;

use ragline_memory::{ChunkId, estimate_tokens};

use crate::retriever::RetrievalResult;

const GROUNDED_PREAMBLE: &str = "Answer the question using only the context below. \
If the context does not contain the answer, say so.";

/// Measures prompt length in tokens.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Four characters per token.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatedTokens;

impl TokenCounter for EstimatedTokens {
    fn count(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub prompt: String,
    /// Chunks included in the prompt, in prompt order.
    pub chunk_ids: Vec<ChunkId>,
    pub tokens: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ContextAssembler<C = EstimatedTokens> {
    counter: C,
}

impl ContextAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: TokenCounter> ContextAssembler<C> {
    #[must_use]
    pub fn with_counter(counter: C) -> Self {
        Self { counter }
    }

    /// Build the prompt for `question` from `result`, within `max_tokens`.
    ///
    /// Chunks are taken in result order until the next one would push the
    /// prompt past the budget. The question is always present, even if that
    /// alone exceeds the budget.
    #[must_use]
    pub fn assemble(&self, question: &str, result: &RetrievalResult, max_tokens: usize) -> AssembledPrompt {
        let mut included: Vec<&str> = Vec::new();
        let mut chunk_ids = Vec::new();
        let mut prompt = render(question, &included);
        let mut tokens = self.counter.count(&prompt);

        for hit in &result.hits {
            included.push(&hit.chunk.text);
            let candidate = render(question, &included);
            let candidate_tokens = self.counter.count(&candidate);
            if candidate_tokens > max_tokens {
                included.pop();
                break;
            }
            prompt = candidate;
            tokens = candidate_tokens;
            chunk_ids.push(hit.id());
        }

        AssembledPrompt {
            prompt,
            chunk_ids,
            tokens,
        }
    }
}

fn render(question: &str, chunks: &[&str]) -> String {
    if chunks.is_empty() {
        return format!("Answer this question: {question}");
    }

    let mut out = String::with_capacity(
        GROUNDED_PREAMBLE.len() + question.len() + chunks.iter().map(|c| c.len() + 8).sum::<usize>() + 32,
    );
    out.push_str(GROUNDED_PREAMBLE);
    out.push_str("\n\nContext:\n");
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let _ = write!(out, "[{}] {chunk}", i + 1);
    }
    let _ = write!(out, "\n\nQuestion: {question}\nAnswer:");
    out
}
