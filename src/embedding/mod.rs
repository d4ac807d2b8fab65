//! Embedding provider boundary.
//!
//! This module provides:
//! - `EmbeddingProvider`: the collaborator that turns text into vectors
//! - `OpenAiEmbeddingProvider`: HTTP client for OpenAI-compatible servers
//! - `CachedEmbeddingProvider` with in-memory and SQLite caches

mod cache;
mod openai;
mod provider;

pub use cache::{
    content_hash, CachedEmbeddingProvider, EmbeddingCache, MemoryEmbeddingCache,
    SqliteEmbeddingCache,
};
pub use openai::OpenAiEmbeddingProvider;
pub use provider::EmbeddingProvider;
