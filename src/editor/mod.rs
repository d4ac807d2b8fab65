//! Copy-on-write editing of a chunk span.
//!
//! [`plan_edit`] only computes the replacement content. Persisting it as a new
//! document and removing the old one is done by
//! [`KnowledgeBase::edit_chunk`](crate::engine::KnowledgeBase::edit_chunk).

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::store::{Chunk, ChunkRange, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Missing {
    Document,
    Chunk(usize),
}

/// Expected, non-fatal reasons an edit was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "missing", rename_all = "snake_case")]
pub enum EditFailure {
    #[error("{0} not found")]
    NotFound(Missing),
    #[error("edit left the targeted span unchanged")]
    NoOp,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Document => f.write_str("document"),
            Missing::Chunk(index) => write!(f, "chunk {}", index),
        }
    }
}

/// Full content of `document` after replacing the first occurrence of
/// `old_span` inside chunks `start_index..=end_index` with `new_span`.
/// An empty `old_span` matches at the start of the span.
///
/// `chunks` must be the document's chunks ordered by index.
pub fn plan_edit(
    document: &Document,
    chunks: &[Chunk],
    start_index: usize,
    end_index: usize,
    old_span: &str,
    new_span: &str,
) -> Result<String, EditFailure> {
    if start_index > end_index {
        return Err(EditFailure::NotFound(Missing::Chunk(start_index)));
    }
    let start = chunks
        .get(start_index)
        .ok_or(EditFailure::NotFound(Missing::Chunk(start_index)))?;
    let end = chunks
        .get(end_index)
        .ok_or(EditFailure::NotFound(Missing::Chunk(end_index)))?;

    let span_range = ChunkRange::new(start.range.start, end.range.end);
    let span = document
        .slice(span_range)
        .ok_or(EditFailure::NotFound(Missing::Chunk(end_index)))?;

    let replaced = span.replacen(old_span, new_span, 1);
    if replaced == span {
        return Err(EditFailure::NoOp);
    }

    let content = &document.content;
    let mut full = String::with_capacity(content.len() - span.len() + replaced.len());
    full.push_str(&content[..span_range.start]);
    full.push_str(&replaced);
    full.push_str(&content[span_range.end..]);
    Ok(full)
}
