//! Ingestion and removal of documents across the chunk store, the vector
//! index and optional `SQLite` persistence.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use ragline_llm::{Embedder, EmbeddingError};

use crate::document::{Chunk, Document, TextSplitter};
use crate::error::MemoryError;
use crate::index::{ScoredChunk, VectorIndex};
use crate::sqlite::SqliteCorpusStore;
use crate::store::ChunkStore;
use crate::types::{ChunkId, DocumentId};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("storage error: {0}")]
    Storage(#[from] MemoryError),

    #[error("document {document_id} was re-ingested concurrently by a newer request")]
    Conflict { document_id: DocumentId },
}

/// A search hit resolved to its chunk.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub chunk: Arc<Chunk>,
    pub score: f32,
}

/// Counts reported by [`Corpus::restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreStats {
    pub documents: usize,
    pub chunks: usize,
}

/// Owns the write path into the corpus.
///
/// Different documents ingest in parallel. Ingestions of the same document
/// are ordered by a ticket taken on entry; only the newest may publish.
pub struct Corpus {
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
    store: Arc<ChunkStore>,
    index: Arc<dyn VectorIndex>,
    persistence: Option<SqliteCorpusStore>,
    tickets: AtomicU64,
    /// Per-document lock guarding the last published ticket.
    documents: Mutex<HashMap<DocumentId, Arc<tokio::sync::Mutex<u64>>>>,
    /// Held for reading across search + chunk resolution, for writing while publishing.
    publication: RwLock<()>,
}

impl Corpus {
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        splitter: TextSplitter,
        store: Arc<ChunkStore>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            embedder,
            splitter,
            store,
            index,
            persistence: None,
            tickets: AtomicU64::new(0),
            documents: Mutex::new(HashMap::new()),
            publication: RwLock::new(()),
        }
    }

    #[must_use]
    pub fn with_persistence(mut self, sqlite: SqliteCorpusStore) -> Self {
        self.persistence = Some(sqlite);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }

    #[must_use]
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    #[must_use]
    pub fn chunk(&self, id: &ChunkId) -> Option<Arc<Chunk>> {
        self.store.get(id)
    }

    #[must_use]
    pub fn document_chunks(&self, id: &DocumentId) -> Option<Vec<ChunkId>> {
        self.store.document_chunks(id)
    }

    /// Metadata of a published document.
    #[must_use]
    pub fn document_metadata(&self, id: &DocumentId) -> Option<BTreeMap<String, String>> {
        self.store.document_metadata(id)
    }

    /// Published state of a document, in the shape persistence accepts.
    fn snapshot_document(&self, id: &DocumentId) -> Option<(Document, Vec<Chunk>)> {
        let ids = self.store.document_chunks(id)?;
        let mut document = Document::new(id.clone(), String::new());
        document.metadata = self.store.document_metadata(id).unwrap_or_default();
        let chunks = ids
            .iter()
            .filter_map(|chunk_id| self.store.get(chunk_id))
            .map(|chunk| (*chunk).clone())
            .collect();
        Some((document, chunks))
    }

    fn document_lock(&self, id: &DocumentId) -> Arc<tokio::sync::Mutex<u64>> {
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(documents.entry(id.clone()).or_default())
    }

    /// Split, embed, persist and publish a document, replacing any previous version.
    ///
    /// Returns the ids of the new chunks in source order. On error nothing
    /// observable changes.
    ///
    /// # Errors
    ///
    /// - [`IngestError::Embedding`] if any chunk fails to embed.
    /// - [`IngestError::Storage`] if persistence fails or the index rejects a vector.
    /// - [`IngestError::Conflict`] if a newer ingestion of the same document published first.
    pub async fn ingest(&self, document: Document) -> Result<Vec<ChunkId>, IngestError> {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        let segments = self.splitter.split(&document.content);
        let mut chunks = Vec::with_capacity(segments.len());
        for segment in segments {
            let embedding = self.embedder.embed(&segment.text).await?;
            chunks.push(Chunk {
                id: ChunkId::derive(
                    &document.id,
                    segment.position,
                    segment.start,
                    segment.end,
                    &segment.text,
                ),
                document_id: document.id.clone(),
                position: segment.position,
                start: segment.start,
                end: segment.end,
                text: segment.text,
                embedding,
            });
        }
        let ids: Vec<ChunkId> = chunks.iter().map(|c| c.id).collect();

        let lock = self.document_lock(&document.id);
        let mut published = lock.lock().await;
        if *published > ticket {
            tracing::warn!(document_id = %document.id, ticket, newer = *published, "ingestion superseded");
            return Err(IngestError::Conflict {
                document_id: document.id,
            });
        }

        let previous = self.store.document_chunks(&document.id).unwrap_or_default();
        let keep: HashSet<ChunkId> = ids.iter().copied().collect();
        let stale: Vec<ChunkId> = previous.into_iter().filter(|id| !keep.contains(id)).collect();
        let entries: Vec<(ChunkId, Vec<f32>)> =
            chunks.iter().map(|c| (c.id, c.embedding.clone())).collect();

        self.index.check_replace(&stale, &entries)?;

        let persisted = match &self.persistence {
            Some(sqlite) => {
                let prior = self.snapshot_document(&document.id);
                sqlite.replace_document(&document, &chunks).await?;
                Some((sqlite, prior))
            }
            None => None,
        };

        let outcome = {
            let _publishing = self
                .publication
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            // replace validates again: a concurrent ingestion may have fixed the dimension
            self.index.replace(&stale, entries).map(|()| {
                self.store.stage(chunks);
                self.store.commit(document.id.clone(), ids.clone());
                self.store
                    .set_metadata(document.id.clone(), document.metadata.clone());
                self.store.discard(&stale);
            })
        };
        if let Err(e) = outcome {
            if let Some((sqlite, prior)) = persisted {
                revert_persisted(sqlite, &document.id, prior).await;
            }
            return Err(e.into());
        }
        *published = ticket;

        tracing::info!(
            document_id = %document.id,
            chunks = ids.len(),
            replaced = stale.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "document ingested"
        );
        Ok(ids)
    }

    /// Remove a document's chunks from every layer.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::DocumentNotFound`] if the document is unknown,
    /// or a storage error if persistence fails.
    pub async fn remove_document(&self, id: &DocumentId) -> Result<Vec<ChunkId>, MemoryError> {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let lock = self.document_lock(id);
        let mut published = lock.lock().await;

        let Some(ids) = self.store.document_chunks(id) else {
            return Err(MemoryError::DocumentNotFound(id.clone()));
        };

        if let Some(sqlite) = &self.persistence {
            sqlite.remove_document(id).await?;
        }

        {
            let _publishing = self
                .publication
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            self.index.replace(&ids, Vec::new())?;
            self.store.remove_document(id);
        }
        *published = ticket;

        tracing::info!(document_id = %id, chunks = ids.len(), "document removed");
        Ok(ids)
    }

    /// Top `k` chunks for an already-embedded query.
    ///
    /// # Errors
    ///
    /// Returns an index error for a malformed query, or
    /// [`MemoryError::ChunkNotFound`] if an index entry has no chunk.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ChunkHit>, MemoryError> {
        let _reading = self
            .publication
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        self.index
            .search(query, k)?
            .into_iter()
            .map(|ScoredChunk { id, score }| {
                self.store
                    .get(&id)
                    .map(|chunk| ChunkHit { chunk, score })
                    .ok_or(MemoryError::ChunkNotFound(id))
            })
            .collect()
    }

    /// Rebuild the store and index from persistence, preserving insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or a stored vector is rejected.
    pub async fn restore(&self) -> Result<RestoreStats, MemoryError> {
        let Some(sqlite) = &self.persistence else {
            return Ok(RestoreStats::default());
        };
        let snapshot = sqlite.load_all().await?;

        let mut lists: HashMap<DocumentId, Vec<(usize, ChunkId)>> = snapshot
            .documents
            .iter()
            .map(|d| (d.id.clone(), Vec::new()))
            .collect();
        let chunk_total = snapshot.chunks.len();

        let _publishing = self
            .publication
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for chunk in snapshot.chunks {
            lists
                .entry(chunk.document_id.clone())
                .or_default()
                .push((chunk.position, chunk.id));
            self.index.upsert(chunk.id, chunk.embedding.clone())?;
            self.store.stage([chunk]);
        }
        let document_total = lists.len();
        for (document_id, mut list) in lists {
            list.sort_unstable_by_key(|(position, _)| *position);
            self.store
                .commit(document_id, list.into_iter().map(|(_, id)| id).collect());
        }
        for stored in snapshot.documents {
            self.store.set_metadata(stored.id, stored.metadata);
        }

        tracing::info!(
            documents = document_total,
            chunks = chunk_total,
            "corpus restored"
        );
        Ok(RestoreStats {
            documents: document_total,
            chunks: chunk_total,
        })
    }
}

/// Put persistence back to what memory still publishes after a rejected publish.
async fn revert_persisted(
    sqlite: &SqliteCorpusStore,
    id: &DocumentId,
    prior: Option<(Document, Vec<Chunk>)>,
) {
    let reverted = match prior {
        Some((document, chunks)) => sqlite.replace_document(&document, &chunks).await,
        None => sqlite.remove_document(id).await.map(|_| ()),
    };
    if let Err(e) = reverted {
        tracing::error!(document_id = %id, error = %e, "failed to revert persisted document");
    }
}

impl std::fmt::Debug for Corpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Corpus")
            .field("embedder", &self.embedder.name())
            .field("chunks", &self.store.chunk_count())
            .field("persistent", &self.persistence.is_some())
            .finish_non_exhaustive()
    }
}
