//! Document store contract and its two backends.
//!
//! A backend persists Documents and their Chunks. The embedding index is not
//! part of this contract: it always lives in memory, owned by
//! [`KnowledgeBase`](crate::engine::KnowledgeBase).

mod memory;
mod sqlite;

pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::config::StorageBackend;
use crate::core::errors::KnowledgeError;

pub type Metadata = Map<String, Value>;

/// A disjoint `[start, end)` byte range into a document's canonical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub start: usize,
    pub end: usize,
}

impl ChunkRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// An immutable stored document. Edits produce a new `Document` with a new id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub number_of_chunks: usize,
    pub metadata: Metadata,
    pub created_at: String,
}

impl Document {
    pub fn new(content: String, number_of_chunks: usize, metadata: Metadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            number_of_chunks,
            metadata,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Canonical text covered by `range`, or `None` if it is out of bounds.
    pub fn slice(&self, range: ChunkRange) -> Option<&str> {
        self.content.get(range.start..range.end)
    }
}

/// One chunk of a document.
///
/// `content` is the embedding window and may overlap its neighbours; `range`
/// is the reconstruction partition and never does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub range: ChunkRange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub documents: usize,
    pub chunks: usize,
}

/// Persistence contract shared by the in-memory and SQLite backends.
///
/// `list_documents` and `all_chunks` return rows in insertion order (chunks
/// ordered by index within their document), which keeps index rebuilds
/// deterministic.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend(&self) -> StorageBackend;

    /// Stores a document together with all of its chunks, or nothing.
    async fn insert_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
    ) -> Result<(), KnowledgeError>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>, KnowledgeError>;

    async fn list_documents(&self) -> Result<Vec<Document>, KnowledgeError>;

    /// Removes a document and its chunks. Returns `false` if it did not exist.
    async fn delete_document(&self, id: &str) -> Result<bool, KnowledgeError>;

    /// Removes every document. Returns how many were deleted.
    async fn clear(&self) -> Result<usize, KnowledgeError>;

    async fn get_chunk(
        &self,
        document_id: &str,
        chunk_index: usize,
    ) -> Result<Option<Chunk>, KnowledgeError>;

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>, KnowledgeError>;

    async fn all_chunks(&self) -> Result<Vec<Chunk>, KnowledgeError>;

    async fn count(&self) -> Result<StoreCounts, KnowledgeError>;
}
