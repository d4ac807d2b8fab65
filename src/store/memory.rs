//! Resident document store. Everything is lost when the process exits.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{Chunk, Document, DocumentStore, StoreCounts};
use crate::core::config::StorageBackend;
use crate::core::errors::KnowledgeError;

struct StoredDocument {
    sequence: u64,
    document: Document,
    chunks: Vec<Chunk>,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<String, StoredDocument>,
    next_sequence: u64,
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Inner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, KnowledgeError> {
        self.inner
            .read()
            .map_err(|_| KnowledgeError::internal("memory document store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, KnowledgeError> {
        self.inner
            .write()
            .map_err(|_| KnowledgeError::internal("memory document store lock poisoned"))
    }
}

fn in_insertion_order(inner: &Inner) -> Vec<&StoredDocument> {
    let mut stored: Vec<&StoredDocument> = inner.documents.values().collect();
    stored.sort_by_key(|entry| entry.sequence);
    stored
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Memory
    }

    async fn insert_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
    ) -> Result<(), KnowledgeError> {
        let mut inner = self.write()?;
        if inner.documents.contains_key(&document.id) {
            return Err(KnowledgeError::Storage(format!(
                "document {} already exists",
                document.id
            )));
        }

        let mut chunks = chunks.to_vec();
        chunks.sort_by_key(|chunk| chunk.chunk_index);

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.documents.insert(
            document.id.clone(),
            StoredDocument {
                sequence,
                document: document.clone(),
                chunks,
            },
        );
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, KnowledgeError> {
        Ok(self
            .read()?
            .documents
            .get(id)
            .map(|entry| entry.document.clone()))
    }

    async fn list_documents(&self) -> Result<Vec<Document>, KnowledgeError> {
        let inner = self.read()?;
        Ok(in_insertion_order(&inner)
            .into_iter()
            .map(|entry| entry.document.clone())
            .collect())
    }

    async fn delete_document(&self, id: &str) -> Result<bool, KnowledgeError> {
        Ok(self.write()?.documents.remove(id).is_some())
    }

    async fn clear(&self) -> Result<usize, KnowledgeError> {
        let mut inner = self.write()?;
        let removed = inner.documents.len();
        inner.documents.clear();
        Ok(removed)
    }

    async fn get_chunk(
        &self,
        document_id: &str,
        chunk_index: usize,
    ) -> Result<Option<Chunk>, KnowledgeError> {
        Ok(self
            .read()?
            .documents
            .get(document_id)
            .and_then(|entry| entry.chunks.get(chunk_index).cloned()))
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>, KnowledgeError> {
        Ok(self
            .read()?
            .documents
            .get(document_id)
            .map(|entry| entry.chunks.clone())
            .unwrap_or_default())
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>, KnowledgeError> {
        let inner = self.read()?;
        Ok(in_insertion_order(&inner)
            .into_iter()
            .flat_map(|entry| entry.chunks.iter().cloned())
            .collect())
    }

    async fn count(&self) -> Result<StoreCounts, KnowledgeError> {
        let inner = self.read()?;
        Ok(StoreCounts {
            documents: inner.documents.len(),
            chunks: inner.documents.values().map(|entry| entry.chunks.len()).sum(),
        })
    }
}
