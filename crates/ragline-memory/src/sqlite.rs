use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::document::{Chunk, Document};
use crate::error::MemoryError;
use crate::types::{ChunkId, DocumentId};

/// Persisted document header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub metadata: BTreeMap<String, String>,
    pub chunk_count: usize,
}

/// Everything needed to rebuild the in-memory corpus.
#[derive(Debug, Default)]
pub struct CorpusSnapshot {
    pub documents: Vec<StoredDocument>,
    /// Chunks in original insertion order.
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone)]
pub struct SqliteCorpusStore {
    pool: SqlitePool,
}

impl SqliteCorpusStore {
    /// Open (or create) the `SQLite` database and run migrations.
    ///
    /// File databases use WAL journaling; `:memory:` uses a single connection
    /// so every query sees the same database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let mut opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(opts)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace a document and its chunks in one transaction.
    ///
    /// Chunks whose id survives keep their insertion sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; the transaction is rolled back.
    pub async fn replace_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
    ) -> Result<(), MemoryError> {
        let metadata = serde_json::to_string(&document.metadata)?;
        let chunk_count = i64::try_from(chunks.len())?;
        let keep: HashSet<String> = chunks.iter().map(|c| c.id.to_string()).collect();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO documents (id, metadata, chunk_count) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET metadata = excluded.metadata, \
             chunk_count = excluded.chunk_count, updated_at = datetime('now')",
        )
        .bind(document.id.as_str())
        .bind(&metadata)
        .bind(chunk_count)
        .execute(&mut *tx)
        .await?;

        let existing: Vec<(String,)> = sqlx::query_as("SELECT id FROM chunks WHERE document_id = ?")
            .bind(document.id.as_str())
            .fetch_all(&mut *tx)
            .await?;
        for (id,) in existing {
            if !keep.contains(&id) {
                sqlx::query("DELETE FROM chunks WHERE id = ?")
                    .bind(&id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, position, start_offset, end_offset, content, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(id) DO UPDATE SET position = excluded.position, \
                 start_offset = excluded.start_offset, end_offset = excluded.end_offset, \
                 content = excluded.content, embedding = excluded.embedding",
            )
            .bind(chunk.id.to_string())
            .bind(chunk.document_id.as_str())
            .bind(i64::try_from(chunk.position)?)
            .bind(i64::try_from(chunk.start)?)
            .bind(i64::try_from(chunk.end)?)
            .bind(&chunk.text)
            .bind(encode_embedding(&chunk.embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete a document and its chunks. Returns `false` if it was not stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn remove_document(&self, id: &DocumentId) -> Result<bool, MemoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Load every document header and every chunk, chunks in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or a row cannot be decoded.
    pub async fn load_all(&self) -> Result<CorpusSnapshot, MemoryError> {
        let doc_rows = sqlx::query("SELECT id, metadata, chunk_count FROM documents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut documents = Vec::with_capacity(doc_rows.len());
        for row in doc_rows {
            let id: String = row.try_get("id")?;
            let metadata: String = row.try_get("metadata")?;
            let chunk_count: i64 = row.try_get("chunk_count")?;
            documents.push(StoredDocument {
                id: DocumentId::new(id),
                metadata: serde_json::from_str(&metadata)?,
                chunk_count: usize::try_from(chunk_count)?,
            });
        }

        let chunk_rows = sqlx::query(
            "SELECT id, document_id, position, start_offset, end_offset, content, embedding \
             FROM chunks ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut chunks = Vec::with_capacity(chunk_rows.len());
        for row in chunk_rows {
            let id: String = row.try_get("id")?;
            let document_id: String = row.try_get("document_id")?;
            let position: i64 = row.try_get("position")?;
            let start: i64 = row.try_get("start_offset")?;
            let end: i64 = row.try_get("end_offset")?;
            let text: String = row.try_get("content")?;
            let blob: Vec<u8> = row.try_get("embedding")?;

            chunks.push(Chunk {
                id: ChunkId::from_str(&id)
                    .map_err(|e| MemoryError::Corrupted(format!("chunk id {id}: {e}")))?,
                document_id: DocumentId::new(document_id),
                position: usize::try_from(position)?,
                start: usize::try_from(start)?,
                end: usize::try_from(end)?,
                text,
                embedding: decode_embedding(&blob)?,
            });
        }

        Ok(CorpusSnapshot { documents, chunks })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn chunk_count(&self) -> Result<usize, MemoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count)?)
    }
}

fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, MemoryError> {
    if bytes.len() % 4 != 0 {
        return Err(MemoryError::Corrupted(format!(
            "embedding blob of {} bytes is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
