use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::document::Chunk;
use crate::types::{ChunkId, DocumentId};

#[derive(Default)]
struct StoreInner {
    chunks: HashMap<ChunkId, Arc<Chunk>>,
    documents: HashMap<DocumentId, Vec<ChunkId>>,
    metadata: HashMap<DocumentId, BTreeMap<String, String>>,
}

/// In-memory map of immutable chunks and the chunk lists of their documents.
///
/// Chunks become visible in two steps: [`ChunkStore::stage`] makes them
/// resolvable by id, [`ChunkStore::commit`] swaps the document's chunk list.
/// Lookups never observe a half-replaced document.
#[derive(Default)]
pub struct ChunkStore {
    inner: RwLock<StoreInner>,
}

impl ChunkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn get(&self, id: &ChunkId) -> Option<Arc<Chunk>> {
        self.read().chunks.get(id).cloned()
    }

    #[must_use]
    pub fn document_chunks(&self, document_id: &DocumentId) -> Option<Vec<ChunkId>> {
        self.read().documents.get(document_id).cloned()
    }

    /// Make chunks resolvable by id without attaching them to their document.
    pub fn stage(&self, chunks: impl IntoIterator<Item = Chunk>) {
        let mut inner = self.write();
        for chunk in chunks {
            inner.chunks.insert(chunk.id, Arc::new(chunk));
        }
    }

    /// Replace the chunk list of a document, returning the previous one.
    pub fn commit(&self, document_id: DocumentId, chunk_ids: Vec<ChunkId>) -> Option<Vec<ChunkId>> {
        self.write().documents.insert(document_id, chunk_ids)
    }

    /// Attach metadata to a document. An empty map clears it.
    pub fn set_metadata(&self, document_id: DocumentId, metadata: BTreeMap<String, String>) {
        let mut inner = self.write();
        if metadata.is_empty() {
            inner.metadata.remove(&document_id);
        } else {
            inner.metadata.insert(document_id, metadata);
        }
    }

    /// Metadata of a committed document; empty when none was given.
    #[must_use]
    pub fn document_metadata(&self, document_id: &DocumentId) -> Option<BTreeMap<String, String>> {
        let inner = self.read();
        inner
            .documents
            .contains_key(document_id)
            .then(|| inner.metadata.get(document_id).cloned().unwrap_or_default())
    }

    /// Drop chunk records. Ids still listed by a document are kept.
    pub fn discard(&self, ids: &[ChunkId]) {
        let mut inner = self.write();
        let StoreInner {
            chunks, documents, ..
        } = &mut *inner;
        for id in ids {
            let referenced = chunks
                .get(id)
                .and_then(|c| documents.get(&c.document_id))
                .is_some_and(|list| list.contains(id));
            if !referenced {
                chunks.remove(id);
            }
        }
    }

    /// Detach a document and drop all of its chunks.
    pub fn remove_document(&self, document_id: &DocumentId) -> Option<Vec<ChunkId>> {
        let mut inner = self.write();
        let ids = inner.documents.remove(document_id)?;
        inner.metadata.remove(document_id);
        for id in &ids {
            inner.chunks.remove(id);
        }
        Some(ids)
    }

    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.read().chunks.len()
    }

    #[must_use]
    pub fn document_count(&self) -> usize {
        self.read().documents.len()
    }
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("chunks", &self.chunk_count())
            .finish_non_exhaustive()
    }
}
