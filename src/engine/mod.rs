//! Caller-facing engine.
//!
//! `KnowledgeBase` ties one [`DocumentStore`] backend to the in-memory
//! [`EmbeddingIndex`] and an [`EmbeddingProvider`]. The index is never
//! persisted; a durable backend needs [`KnowledgeBase::reload_index_from_storage`]
//! after a restart.

pub mod locks;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::chunking::{partition, validate_geometry};
use crate::core::config::{defaults, ChunkingSettings, StorageBackend};
use crate::core::errors::KnowledgeError;
use crate::editor::{plan_edit, EditFailure, Missing};
use crate::embedding::EmbeddingProvider;
use crate::index::EmbeddingIndex;
use crate::render::{group_requests, render_document, ChunkRangeRequest, RenderedDocument};
use crate::store::{Chunk, Document, DocumentStore, Metadata};
use crate::vector_math::ensure_finite;

use self::locks::DocumentLocks;

/// One search result. `text` is the chunk's embedding window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeStats {
    pub backend: StorageBackend,
    pub documents: usize,
    pub chunks: usize,
    pub indexed_entries: usize,
    pub dimension: Option<usize>,
}

pub struct KnowledgeBase {
    store: Arc<dyn DocumentStore>,
    index: RwLock<EmbeddingIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    chunking: ChunkingSettings,
    concurrency: usize,
    default_top_k: usize,
    locks: DocumentLocks,
}

impl KnowledgeBase {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingSettings,
    ) -> Result<Self, KnowledgeError> {
        validate_geometry(chunking.chunk_size, chunking.chunk_overlap)?;
        Ok(Self {
            store,
            index: RwLock::new(EmbeddingIndex::new()),
            provider,
            chunking,
            concurrency: 1,
            default_top_k: defaults::SEARCH_TOP_K,
            locks: DocumentLocks::new(),
        })
    }

    /// Number of embedding calls allowed in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Result count used by [`KnowledgeBase::search_default`].
    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn backend(&self) -> StorageBackend {
        self.store.backend()
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn chunking(&self) -> &ChunkingSettings {
        &self.chunking
    }

    /// Embeds `texts`, returning vectors in input order. Non-finite vectors
    /// are rejected.
    async fn embed_all(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        let provider = Arc::clone(&self.provider);
        stream::iter(texts)
            .map(move |text| {
                let provider = Arc::clone(&provider);
                async move {
                    let vector = provider.embed(&text).await?;
                    ensure_finite(&vector)?;
                    Ok::<_, KnowledgeError>(vector)
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    /// Partitions, embeds and stores `text` as a new document.
    ///
    /// Every window is embedded before anything is written, so a provider
    /// failure leaves neither a document nor index entries behind. The index
    /// write lock is held across the store insert, which keeps a concurrent
    /// reload from indexing the document a second time.
    pub async fn add_document(
        &self,
        text: &str,
        metadata: Option<Metadata>,
    ) -> Result<Document, KnowledgeError> {
        let partition = partition(text, self.chunking.chunk_size, self.chunking.chunk_overlap)?;
        let document = Document::new(
            text.to_string(),
            partition.len(),
            metadata.unwrap_or_default(),
        );

        let vectors = self.embed_all(partition.windows.clone()).await?;
        let chunks = partition.into_chunks(&document.id);

        let mut index = self.index.write().await;
        check_dimensions(index.dimension(), &vectors)?;
        self.store.insert_document(&document, &chunks).await?;

        if let Err(err) = index.add_all(chunks.into_iter().zip(vectors).collect()) {
            if let Err(rollback) = self.store.delete_document(&document.id).await {
                tracing::warn!(
                    "Failed to roll back document {} after index error: {}",
                    document.id,
                    rollback
                );
            }
            return Err(err);
        }
        drop(index);

        tracing::info!(
            "Added document {} ({} chars, {} chunks)",
            document.id,
            document.content.chars().count(),
            document.number_of_chunks
        );
        Ok(document)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>, KnowledgeError> {
        self.store.get_document(id).await
    }

    pub async fn get_all_documents(&self) -> Result<Vec<Document>, KnowledgeError> {
        self.store.list_documents().await
    }

    /// Removes a document, its chunks and its index entries.
    pub async fn delete_document(&self, id: &str) -> Result<bool, KnowledgeError> {
        let _guard = self.locks.lock(id).await;
        self.delete_unlocked(id).await
    }

    async fn delete_unlocked(&self, id: &str) -> Result<bool, KnowledgeError> {
        let deleted = self.store.delete_document(id).await?;
        let removed = self.index.write().await.remove_document(id);
        if deleted {
            tracing::info!("Deleted document {} ({} index entries)", id, removed);
        }
        Ok(deleted)
    }

    /// Removes every document. Returns how many were deleted.
    pub async fn clear_all_documents(&self) -> Result<usize, KnowledgeError> {
        let mut index = self.index.write().await;
        let deleted = self.store.clear().await?;
        index.clear();
        tracing::info!("Cleared {} documents", deleted);
        Ok(deleted)
    }

    pub async fn get_chunk_by_index(
        &self,
        document_id: &str,
        chunk_index: usize,
    ) -> Result<Option<Chunk>, KnowledgeError> {
        self.store.get_chunk(document_id, chunk_index).await
    }

    /// [`KnowledgeBase::search`] with the configured result count and no skip.
    pub async fn search_default(&self, query: &str) -> Result<Vec<SearchHit>, KnowledgeError> {
        self.search(query, self.default_top_k, 0).await
    }

    /// The `top_k` chunks most similar to `query` after skipping the `skip`
    /// best ones.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        skip: usize,
    ) -> Result<Vec<SearchHit>, KnowledgeError> {
        if top_k == 0 || self.index.read().await.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.provider.embed(query).await?;
        let scored = self.index.read().await.search(&vector, top_k, skip)?;
        tracing::debug!("Search returned {} of top {} (skip {})", scored.len(), top_k, skip);

        Ok(scored
            .into_iter()
            .map(|scored| SearchHit {
                document_id: scored.chunk.document_id,
                chunk_index: scored.chunk.chunk_index,
                text: scored.chunk.content,
                similarity: scored.similarity,
            })
            .collect())
    }

    /// Renders the requested chunk ranges, one unit per distinct document in
    /// order of first appearance.
    pub async fn render(
        &self,
        requests: &[ChunkRangeRequest],
    ) -> Result<Vec<RenderedDocument>, KnowledgeError> {
        let mut rendered = Vec::new();
        for (document_id, ranges) in group_requests(requests) {
            let Some(document) = self.store.get_document(&document_id).await? else {
                rendered.push(RenderedDocument::NotFound { document_id });
                continue;
            };
            let chunks = self.store.get_chunks(&document.id).await?;
            rendered.push(render_document(&document, &chunks, &ranges)?);
        }
        Ok(rendered)
    }

    /// Replaces the first occurrence of `old_span` within chunks
    /// `start_index..=end_index` and stores the result as a new document.
    ///
    /// The outer error carries provider and storage failures; the inner one
    /// reports why no edit was made. The new document is written before the
    /// old one is deleted, so a failure in between leaves both.
    pub async fn edit_chunk(
        &self,
        document_id: &str,
        start_index: usize,
        end_index: usize,
        old_span: &str,
        new_span: &str,
    ) -> Result<Result<Document, EditFailure>, KnowledgeError> {
        let _guard = self.locks.lock(document_id).await;

        let Some(document) = self.store.get_document(document_id).await? else {
            return Ok(Err(EditFailure::NotFound(Missing::Document)));
        };
        let chunks = self.store.get_chunks(document_id).await?;

        let content = match plan_edit(
            &document,
            &chunks,
            start_index,
            end_index,
            old_span,
            new_span,
        ) {
            Ok(content) => content,
            Err(failure) => {
                tracing::debug!("Edit of {} not applied: {}", document_id, failure);
                return Ok(Err(failure));
            }
        };

        let edited = self
            .add_document(&content, Some(document.metadata.clone()))
            .await?;

        if let Err(err) = self.delete_unlocked(document_id).await {
            tracing::warn!(
                "Edit stored {} but could not delete original {}: {}",
                edited.id,
                document_id,
                err
            );
            return Err(err);
        }

        tracing::info!("Edited document {} into {}", document_id, edited.id);
        Ok(Ok(edited))
    }

    /// Rebuilds the index by re-embedding every stored chunk window, then
    /// swaps it in. Returns the number of indexed chunks.
    ///
    /// Searches and additions wait until the rebuild finishes. If embedding
    /// fails the current index is kept.
    pub async fn reload_index_from_storage(&self) -> Result<usize, KnowledgeError> {
        let mut index = self.index.write().await;

        let chunks = self.store.all_chunks().await?;
        let windows = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embed_all(windows).await?;

        let mut rebuilt = EmbeddingIndex::new();
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            rebuilt.add(chunk, vector)?;
        }

        let count = rebuilt.len();
        *index = rebuilt;
        tracing::info!(
            "Rebuilt embedding index from {} storage ({} chunks)",
            self.store.backend().as_str(),
            count
        );
        Ok(count)
    }

    pub async fn stats(&self) -> Result<KnowledgeStats, KnowledgeError> {
        let counts = self.store.count().await?;
        let index = self.index.read().await;
        Ok(KnowledgeStats {
            backend: self.store.backend(),
            documents: counts.documents,
            chunks: counts.chunks,
            indexed_entries: index.len(),
            dimension: index.dimension(),
        })
    }
}

/// Checks `vectors` against the index dimension, or against each other when
/// the index has none yet.
fn check_dimensions(current: Option<usize>, vectors: &[Vec<f32>]) -> Result<(), KnowledgeError> {
    let Some(expected) = current.or_else(|| vectors.first().map(Vec::len)) else {
        return Ok(());
    };
    match vectors.iter().find(|v| v.len() != expected) {
        Some(bad) => Err(KnowledgeError::DimensionMismatch {
            expected,
            actual: bad.len(),
        }),
        None => Ok(()),
    }
}
