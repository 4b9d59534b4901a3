//! Document chunking, chunk storage, nearest-neighbour index, and persistence.

pub mod corpus;
pub mod document;
pub mod error;
pub mod index;
pub mod sqlite;
pub mod store;
pub mod tokens;
pub mod types;

pub use corpus::{ChunkHit, Corpus, IngestError, RestoreStats};
pub use document::{Chunk, Document, SplitterConfig, TextSplitter};
pub use error::MemoryError;
pub use index::{ExactIndex, Metric, ScoredChunk, VectorIndex};
pub use sqlite::SqliteCorpusStore;
pub use store::ChunkStore;
pub use tokens::estimate_tokens;
pub use types::{ChunkId, DocumentId};
