pub mod error;
pub mod loader;
pub mod splitter;
pub mod types;

pub use error::DocumentError;
pub use loader::{TextLoader, discover};
pub use splitter::{Segment, SplitterConfig, TextSplitter};
pub use types::{Chunk, Document};

/// Default maximum file size: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub trait DocumentLoader: Send + Sync {
    fn load(
        &self,
        path: &std::path::Path,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Document, DocumentError>> + Send + '_>,
    >;

    fn supported_extensions(&self) -> &[&str];
}
