//! Chunk partitioner.
//!
//! Splits text into two parallel geometries:
//! - disjoint reconstruction ranges that step forward by `chunk_size`
//!   characters and tile the whole text
//! - embedding windows that cover a range plus the `chunk_overlap`
//!   characters preceding it
//!
//! Sizes are counted in characters; the recorded boundaries are byte offsets,
//! so they can slice the original `&str` directly.

use crate::core::errors::KnowledgeError;
use crate::store::{Chunk, ChunkRange};

/// Output of [`partition`]: `windows[i]` is embedded for chunk `i`, and
/// `boundaries[i]` is where chunk `i`'s reconstruction range ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub windows: Vec<String>,
    pub boundaries: Vec<usize>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Range of chunk `index`: from the previous boundary (or 0) to its own.
    pub fn range(&self, index: usize) -> ChunkRange {
        let start = if index == 0 {
            0
        } else {
            self.boundaries[index - 1]
        };
        ChunkRange::new(start, self.boundaries[index])
    }

    pub fn into_chunks(self, document_id: &str) -> Vec<Chunk> {
        let ranges: Vec<ChunkRange> = (0..self.len()).map(|i| self.range(i)).collect();
        self.windows
            .into_iter()
            .zip(ranges)
            .enumerate()
            .map(|(chunk_index, (content, range))| Chunk {
                document_id: document_id.to_string(),
                chunk_index,
                content,
                range,
            })
            .collect()
    }
}

pub fn validate_geometry(chunk_size: usize, chunk_overlap: usize) -> Result<(), KnowledgeError> {
    if chunk_size == 0 {
        return Err(KnowledgeError::InvalidConfig(
            "chunk_size must be at least 1".to_string(),
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(KnowledgeError::InvalidConfig(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }
    Ok(())
}

/// Partitions `text` into at least one chunk.
///
/// Text no longer than `chunk_size` yields a single window equal to the text
/// with one boundary at its end (empty text included).
pub fn partition(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Partition, KnowledgeError> {
    validate_geometry(chunk_size, chunk_overlap)?;

    // byte offset of every char, plus the end of the text
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = offsets.len() - 1;

    let mut windows = Vec::with_capacity(total_chars / chunk_size + 1);
    let mut boundaries = Vec::with_capacity(total_chars / chunk_size + 1);
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(total_chars);
        let window_start = start.saturating_sub(chunk_overlap);

        windows.push(text[offsets[window_start]..offsets[end]].to_string());
        boundaries.push(offsets[end]);

        if end == total_chars {
            break;
        }
        start = end;
    }

    Ok(Partition {
        windows,
        boundaries,
    })
}
