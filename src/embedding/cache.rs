//! Pass-through embedding cache keyed by the SHA-256 of the embedded text.
//!
//! The cache only saves provider calls. Cache failures are logged and the
//! provider is called as if the entry were absent.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use super::provider::EmbeddingProvider;
use crate::core::errors::KnowledgeError;
use crate::store::SqliteDocumentStore;

pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[async_trait]
pub trait EmbeddingCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<f32>>, KnowledgeError>;

    async fn put(&self, key: &str, vector: &[f32]) -> Result<(), KnowledgeError>;
}

#[derive(Default)]
pub struct MemoryEmbeddingCache {
    entries: RwLock<HashMap<String, Vec<f32>>>,
}

impl MemoryEmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EmbeddingCache for MemoryEmbeddingCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<f32>>, KnowledgeError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| KnowledgeError::internal("embedding cache lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, vector: &[f32]) -> Result<(), KnowledgeError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| KnowledgeError::internal("embedding cache lock poisoned"))?;
        entries.insert(key.to_string(), vector.to_vec());
        Ok(())
    }
}

/// Durable cache stored next to the documents, scoped to one model.
#[derive(Clone)]
pub struct SqliteEmbeddingCache {
    pool: SqlitePool,
    model: String,
}

impl SqliteEmbeddingCache {
    pub fn new(store: &SqliteDocumentStore, model: &str) -> Self {
        Self {
            pool: store.pool().clone(),
            model: model.to_string(),
        }
    }

    pub async fn count(&self) -> Result<usize, KnowledgeError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embedding_cache WHERE model = ?1")
            .bind(&self.model)
            .fetch_one(&self.pool)
            .await
            .map_err(KnowledgeError::storage)?;
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl EmbeddingCache for SqliteEmbeddingCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<f32>>, KnowledgeError> {
        let blob: Option<Vec<u8>> = sqlx::query_scalar(
            "SELECT embedding FROM embedding_cache WHERE model = ?1 AND content_hash = ?2",
        )
        .bind(&self.model)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(KnowledgeError::storage)?;

        Ok(blob
            .filter(|bytes| !bytes.is_empty())
            .map(|bytes| deserialize_embedding(&bytes)))
    }

    async fn put(&self, key: &str, vector: &[f32]) -> Result<(), KnowledgeError> {
        sqlx::query(
            "INSERT OR REPLACE INTO embedding_cache (model, content_hash, embedding)
             VALUES (?1, ?2, ?3)",
        )
        .bind(&self.model)
        .bind(key)
        .bind(serialize_embedding(vector))
        .execute(&self.pool)
        .await
        .map_err(KnowledgeError::storage)?;
        Ok(())
    }
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Wraps a provider with a cache lookup in front of every call.
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Arc<dyn EmbeddingCache>,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, cache: Arc<dyn EmbeddingCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    fn name(&self) -> &str {
        "cached"
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let key = content_hash(text);

        match self.cache.get(&key).await {
            Ok(Some(vector)) => return Ok(vector),
            Ok(None) => {}
            Err(err) => tracing::warn!("Embedding cache lookup failed: {}", err),
        }

        let vector = self.inner.embed(text).await?;
        if let Err(err) = self.cache.put(&key, &vector).await {
            tracing::warn!("Embedding cache write failed: {}", err);
        }
        Ok(vector)
    }
}
