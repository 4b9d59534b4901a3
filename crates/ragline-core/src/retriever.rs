use std::sync::Arc;

use ragline_llm::EmbeddingError;
use ragline_memory::{Chunk, ChunkId, Corpus, MemoryError};

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index lookup failed: {0}")]
    Index(MemoryError),

    #[error("index entry {0} has no chunk in the store")]
    Corrupted(ChunkId),
}

impl From<MemoryError> for RetrievalError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::ChunkNotFound(id) => Self::Corrupted(id),
            other => Self::Index(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Arc<Chunk>,
    pub score: f32,
}

impl RetrievedChunk {
    #[must_use]
    pub fn id(&self) -> ChunkId {
        self.chunk.id
    }
}

/// Hits in descending score order. Scores compare within one result only.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    #[must_use]
    pub fn ids(&self) -> Vec<ChunkId> {
        self.hits.iter().map(RetrievedChunk::id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Embeds questions with the corpus embedder and looks them up in its index.
#[derive(Debug, Clone)]
pub struct Retriever {
    corpus: Arc<Corpus>,
    score_threshold: Option<f32>,
}

impl Retriever {
    #[must_use]
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self {
            corpus,
            score_threshold: None,
        }
    }

    #[must_use]
    pub fn with_score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Top `k` chunks for `question`.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::Embedding`] if the embedding function fails or times out.
    /// - [`RetrievalError::Index`] if the query vector does not fit the index.
    /// - [`RetrievalError::Corrupted`] if an index entry does not resolve to a chunk.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<RetrievalResult, RetrievalError> {
        let query = self.corpus.embedder().embed(question).await?;
        let hits = self.corpus.search(&query, k)?;

        let hits: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter(|hit| self.score_threshold.is_none_or(|t| hit.score >= t))
            .map(|hit| RetrievedChunk {
                chunk: hit.chunk,
                score: hit.score,
            })
            .collect();

        tracing::debug!(k, hits = hits.len(), "retrieval completed");
        Ok(RetrievalResult { hits })
    }
}
