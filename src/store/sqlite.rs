//! SQLite-backed document store.
//!
//! Documents and chunks are durable; embeddings are not stored here (apart
//! from the optional embedding cache table), so the engine rebuilds its index
//! with `reload_index_from_storage` after a restart.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{Chunk, ChunkRange, Document, DocumentStore, Metadata, StoreCounts};
use crate::core::config::{AppPaths, StorageBackend};
use crate::core::errors::KnowledgeError;

const EMBEDDING_MODEL_KEY: &str = "embedding_model";

#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteDocumentStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, KnowledgeError> {
        Self::with_path(paths.db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, KnowledgeError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(KnowledgeError::storage)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        tracing::debug!("Opened document store at {}", store.db_path.display());
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<(), KnowledgeError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                number_of_chunks INTEGER NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(KnowledgeError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                range_start INTEGER NOT NULL,
                range_end INTEGER NOT NULL,
                PRIMARY KEY (document_id, chunk_index),
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(KnowledgeError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS embedding_cache (
                model TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (model, content_hash)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(KnowledgeError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kb_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(KnowledgeError::storage)?;

        Ok(())
    }

    /// Embedding model recorded by the previous run, if any.
    pub async fn embedding_model(&self) -> Result<Option<String>, KnowledgeError> {
        sqlx::query_scalar("SELECT value FROM kb_meta WHERE key = ?1")
            .bind(EMBEDDING_MODEL_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(KnowledgeError::storage)
    }

    pub async fn set_embedding_model(&self, model: &str) -> Result<(), KnowledgeError> {
        sqlx::query(
            "INSERT OR REPLACE INTO kb_meta (key, value, updated_at)
             VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(EMBEDDING_MODEL_KEY)
        .bind(model)
        .execute(&self.pool)
        .await
        .map_err(KnowledgeError::storage)?;
        Ok(())
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document, KnowledgeError> {
        let metadata_str: String = row.try_get("metadata").map_err(KnowledgeError::storage)?;
        let metadata = serde_json::from_str::<Metadata>(&metadata_str)
            .map_err(KnowledgeError::storage)?;
        let number_of_chunks: i64 = row
            .try_get("number_of_chunks")
            .map_err(KnowledgeError::storage)?;

        Ok(Document {
            id: row.try_get("id").map_err(KnowledgeError::storage)?,
            content: row.try_get("content").map_err(KnowledgeError::storage)?,
            number_of_chunks: to_usize(number_of_chunks)?,
            metadata,
            created_at: row.try_get("created_at").map_err(KnowledgeError::storage)?,
        })
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk, KnowledgeError> {
        let chunk_index: i64 = row.try_get("chunk_index").map_err(KnowledgeError::storage)?;
        let range_start: i64 = row.try_get("range_start").map_err(KnowledgeError::storage)?;
        let range_end: i64 = row.try_get("range_end").map_err(KnowledgeError::storage)?;

        Ok(Chunk {
            document_id: row.try_get("document_id").map_err(KnowledgeError::storage)?,
            chunk_index: to_usize(chunk_index)?,
            content: row.try_get("content").map_err(KnowledgeError::storage)?,
            range: ChunkRange::new(to_usize(range_start)?, to_usize(range_end)?),
        })
    }
}

fn to_usize(value: i64) -> Result<usize, KnowledgeError> {
    usize::try_from(value)
        .map_err(|_| KnowledgeError::Storage(format!("negative value in column: {}", value)))
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Sqlite
    }

    async fn insert_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
    ) -> Result<(), KnowledgeError> {
        let metadata_str =
            serde_json::to_string(&document.metadata).map_err(KnowledgeError::internal)?;

        let mut tx = self.pool.begin().await.map_err(KnowledgeError::storage)?;

        sqlx::query(
            "INSERT INTO documents (id, content, number_of_chunks, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&document.id)
        .bind(&document.content)
        .bind(document.number_of_chunks as i64)
        .bind(&metadata_str)
        .bind(&document.created_at)
        .execute(&mut *tx)
        .await
        .map_err(KnowledgeError::storage)?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (document_id, chunk_index, content, range_start, range_end)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.content)
            .bind(chunk.range.start as i64)
            .bind(chunk.range.end as i64)
            .execute(&mut *tx)
            .await
            .map_err(KnowledgeError::storage)?;
        }

        tx.commit().await.map_err(KnowledgeError::storage)?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, KnowledgeError> {
        let row = sqlx::query(
            "SELECT id, content, number_of_chunks, metadata, created_at
             FROM documents
             WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(KnowledgeError::storage)?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>, KnowledgeError> {
        let rows = sqlx::query(
            "SELECT id, content, number_of_chunks, metadata, created_at
             FROM documents
             ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(KnowledgeError::storage)?;

        rows.iter().map(Self::row_to_document).collect()
    }

    async fn delete_document(&self, id: &str) -> Result<bool, KnowledgeError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(KnowledgeError::storage)?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> Result<usize, KnowledgeError> {
        let result = sqlx::query("DELETE FROM documents")
            .execute(&self.pool)
            .await
            .map_err(KnowledgeError::storage)?;

        Ok(result.rows_affected() as usize)
    }

    async fn get_chunk(
        &self,
        document_id: &str,
        chunk_index: usize,
    ) -> Result<Option<Chunk>, KnowledgeError> {
        let row = sqlx::query(
            "SELECT document_id, chunk_index, content, range_start, range_end
             FROM chunks
             WHERE document_id = ?1 AND chunk_index = ?2",
        )
        .bind(document_id)
        .bind(chunk_index as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(KnowledgeError::storage)?;

        row.as_ref().map(Self::row_to_chunk).transpose()
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>, KnowledgeError> {
        let rows = sqlx::query(
            "SELECT document_id, chunk_index, content, range_start, range_end
             FROM chunks
             WHERE document_id = ?1
             ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(KnowledgeError::storage)?;

        rows.iter().map(Self::row_to_chunk).collect()
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>, KnowledgeError> {
        let rows = sqlx::query(
            "SELECT c.document_id, c.chunk_index, c.content, c.range_start, c.range_end
             FROM chunks c
             JOIN documents d ON d.id = c.document_id
             ORDER BY d.rowid, c.chunk_index",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(KnowledgeError::storage)?;

        rows.iter().map(Self::row_to_chunk).collect()
    }

    async fn count(&self) -> Result<StoreCounts, KnowledgeError> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(KnowledgeError::storage)?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(KnowledgeError::storage)?;

        Ok(StoreCounts {
            documents: to_usize(documents)?,
            chunks: to_usize(chunks)?,
        })
    }
}
