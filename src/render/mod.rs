//! Range renderer.
//!
//! Turns requested chunk-index ranges back into exact document text. For each
//! document the requested ranges are clipped, sorted and merged; every chunk
//! index is then covered by exactly one span, either shown (with the text of
//! its reconstruction ranges) or omitted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::KnowledgeError;
use crate::store::{Chunk, ChunkRange, Document};

/// Inclusive chunk-index range of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRangeRequest {
    pub document_id: String,
    pub start_index: usize,
    pub end_index: usize,
}

impl ChunkRangeRequest {
    pub fn new(document_id: impl Into<String>, start_index: usize, end_index: usize) -> Self {
        Self {
            document_id: document_id.into(),
            start_index,
            end_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderedSpan {
    Shown {
        start: usize,
        end: usize,
        text: String,
    },
    Omitted {
        start: usize,
        end: usize,
    },
}

impl RenderedSpan {
    pub fn start(&self) -> usize {
        match self {
            RenderedSpan::Shown { start, .. } | RenderedSpan::Omitted { start, .. } => *start,
        }
    }

    pub fn end(&self) -> usize {
        match self {
            RenderedSpan::Shown { end, .. } | RenderedSpan::Omitted { end, .. } => *end,
        }
    }

    pub fn is_shown(&self) -> bool {
        matches!(self, RenderedSpan::Shown { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderedDocument {
    NotFound {
        document_id: String,
    },
    Found {
        document_id: String,
        number_of_chunks: usize,
        spans: Vec<RenderedSpan>,
    },
}

impl RenderedDocument {
    pub fn document_id(&self) -> &str {
        match self {
            RenderedDocument::NotFound { document_id }
            | RenderedDocument::Found { document_id, .. } => document_id,
        }
    }

    pub fn spans(&self) -> &[RenderedSpan] {
        match self {
            RenderedDocument::NotFound { .. } => &[],
            RenderedDocument::Found { spans, .. } => spans,
        }
    }
}

/// Groups requests per document, keeping the order in which documents first
/// appear.
pub fn group_requests(requests: &[ChunkRangeRequest]) -> Vec<(String, Vec<(usize, usize)>)> {
    let mut groups: Vec<(String, Vec<(usize, usize)>)> = Vec::new();
    for request in requests {
        let range = (request.start_index, request.end_index);
        match groups
            .iter_mut()
            .find(|(document_id, _)| *document_id == request.document_id)
        {
            Some((_, ranges)) => ranges.push(range),
            None => groups.push((request.document_id.clone(), vec![range])),
        }
    }
    groups
}

/// Clips, sorts and merges inclusive ranges.
///
/// Ends are clipped to the last chunk; ranges left with `start > end` are
/// dropped. Ranges that overlap or touch (`next.start <= current.end + 1`)
/// are merged.
pub fn merge_ranges(ranges: &[(usize, usize)], number_of_chunks: usize) -> Vec<(usize, usize)> {
    let Some(last_index) = number_of_chunks.checked_sub(1) else {
        return Vec::new();
    };

    let mut clipped: Vec<(usize, usize)> = ranges
        .iter()
        .map(|&(start, end)| (start, end.min(last_index)))
        .filter(|&(start, end)| start <= end)
        .collect();
    clipped.sort_by_key(|&(start, _)| start);

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(clipped.len());
    for (start, end) in clipped {
        match merged.last_mut() {
            Some(current) if start <= current.1 + 1 => current.1 = current.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Renders one document. `chunks` must hold all of the document's chunks
/// ordered by index.
pub fn render_document(
    document: &Document,
    chunks: &[Chunk],
    ranges: &[(usize, usize)],
) -> Result<RenderedDocument, KnowledgeError> {
    let number_of_chunks = document.number_of_chunks;
    if chunks.len() != number_of_chunks {
        return Err(KnowledgeError::Storage(format!(
            "document {} has {} stored chunks, expected {}",
            document.id,
            chunks.len(),
            number_of_chunks
        )));
    }

    let mut spans = Vec::new();
    let mut cursor = 0usize;

    for (start, end) in merge_ranges(ranges, number_of_chunks) {
        if start > cursor {
            spans.push(RenderedSpan::Omitted {
                start: cursor,
                end: start - 1,
            });
        }

        let range = ChunkRange::new(chunks[start].range.start, chunks[end].range.end);
        let text = document.slice(range).ok_or_else(|| {
            KnowledgeError::Storage(format!(
                "chunk range {}..{} is outside document {}",
                range.start, range.end, document.id
            ))
        })?;
        spans.push(RenderedSpan::Shown {
            start,
            end,
            text: text.to_string(),
        });

        cursor = end + 1;
    }

    if cursor < number_of_chunks {
        spans.push(RenderedSpan::Omitted {
            start: cursor,
            end: number_of_chunks - 1,
        });
    }

    Ok(RenderedDocument::Found {
        document_id: document.id.clone(),
        number_of_chunks,
        spans,
    })
}

fn write_index_label(f: &mut fmt::Formatter<'_>, start: usize, end: usize) -> fmt::Result {
    if start == end {
        write!(f, "chunk {}", start)
    } else {
        write!(f, "chunks {}-{}", start, end)
    }
}

impl fmt::Display for RenderedSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderedSpan::Shown { start, end, text } => {
                f.write_str("[")?;
                write_index_label(f, *start, *end)?;
                writeln!(f, "]")?;
                f.write_str(text)
            }
            RenderedSpan::Omitted { start, end } => {
                f.write_str("[")?;
                write_index_label(f, *start, *end)?;
                f.write_str(" omitted]")
            }
        }
    }
}

impl fmt::Display for RenderedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderedDocument::NotFound { document_id } => {
                write!(f, "[document {} not found]", document_id)
            }
            RenderedDocument::Found {
                document_id,
                number_of_chunks,
                spans,
            } => {
                write!(f, "[document {} ({} chunks)]", document_id, number_of_chunks)?;
                for span in spans {
                    write!(f, "\n{}", span)?;
                }
                Ok(())
            }
        }
    }
}

/// Plain-text rendering of several documents, separated by blank lines.
pub fn to_text(rendered: &[RenderedDocument]) -> String {
    rendered
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n\n")
}
