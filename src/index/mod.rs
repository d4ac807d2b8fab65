//! In-memory embedding index with exhaustive cosine ranking.

use serde::Serialize;

use crate::core::errors::KnowledgeError;
use crate::store::Chunk;
use crate::vector_math::{cosine_similarity, ensure_finite};

#[derive(Debug, Clone)]
pub struct EmbeddingEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

/// Store-wide collection of chunk embeddings.
///
/// Entries are kept in insertion order; ranking relies on that order to break
/// ties. The dimension is fixed by the first vector added and released again
/// once the index is empty. Only finite vectors are accepted.
#[derive(Debug, Default)]
pub struct EmbeddingIndex {
    entries: Vec<EmbeddingEntry>,
    dimension: Option<usize>,
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.chunk.document_id == document_id)
    }

    pub fn add(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<(), KnowledgeError> {
        self.check_dimension(vector.len())?;
        ensure_finite(&vector)?;
        self.dimension = Some(vector.len());
        self.entries.push(EmbeddingEntry { chunk, vector });
        Ok(())
    }

    /// Adds a document's chunks in order. Nothing is added if any vector has
    /// the wrong dimension or a non-finite component.
    pub fn add_all(&mut self, items: Vec<(Chunk, Vec<f32>)>) -> Result<(), KnowledgeError> {
        for (_, vector) in &items {
            ensure_finite(vector)?;
        }
        let expected = self.dimension.or_else(|| items.first().map(|(_, v)| v.len()));
        if let Some(expected) = expected {
            if let Some((_, bad)) = items.iter().find(|(_, v)| v.len() != expected) {
                return Err(KnowledgeError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        for (chunk, vector) in items {
            self.add(chunk, vector)?;
        }
        Ok(())
    }

    /// Top `top_k` chunks after skipping the `skip` best, by descending
    /// similarity. Equal scores keep insertion order.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        skip: usize,
    ) -> Result<Vec<ScoredChunk>, KnowledgeError> {
        self.check_dimension(query.len())?;
        ensure_finite(query)?;
        if top_k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored = Vec::with_capacity(self.entries.len());
        for (position, entry) in self.entries.iter().enumerate() {
            let similarity = cosine_similarity(query, &entry.vector)?;
            scored.push((position, similarity));
        }

        // Finite inputs can still overflow to NaN; those rank last.
        scored.sort_by(|left, right| {
            rank_key(right.1)
                .total_cmp(&rank_key(left.1))
                .then_with(|| left.0.cmp(&right.0))
        });

        Ok(scored
            .into_iter()
            .take(top_k.saturating_add(skip))
            .skip(skip)
            .map(|(position, similarity)| ScoredChunk {
                chunk: self.entries[position].chunk.clone(),
                similarity,
            })
            .collect())
    }

    /// Drops every entry of `document_id`, returning how many were removed.
    pub fn remove_document(&mut self, document_id: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.chunk.document_id != document_id);
        if self.entries.is_empty() {
            self.dimension = None;
        }
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dimension = None;
    }

    fn check_dimension(&self, actual: usize) -> Result<(), KnowledgeError> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(KnowledgeError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

fn rank_key(similarity: f32) -> f32 {
    if similarity.is_nan() {
        f32::NEG_INFINITY
    } else {
        similarity
    }
}
