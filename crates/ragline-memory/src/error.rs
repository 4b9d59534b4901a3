use crate::types::{ChunkId, DocumentId};

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("integer conversion: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),

    #[error("chunk not found: {0}")]
    ChunkNotFound(ChunkId),

    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("embedding dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid vector: {0}")]
    InvalidVector(String),

    #[error("corrupted row: {0}")]
    Corrupted(String),
}

impl MemoryError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ChunkNotFound(_) | Self::DocumentNotFound(_))
    }
}
