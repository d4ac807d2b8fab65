pub mod chunking;
pub mod core;
pub mod editor;
pub mod embedding;
pub mod engine;
pub mod index;
pub mod render;
pub mod state;
pub mod store;
pub mod vector_math;

pub use crate::core::errors::KnowledgeError;
pub use editor::{EditFailure, Missing};
pub use engine::{KnowledgeBase, KnowledgeStats, SearchHit};
pub use render::{ChunkRangeRequest, RenderedDocument, RenderedSpan};
pub use state::KnowledgeState;
pub use store::{Chunk, ChunkRange, Document, DocumentStore, Metadata};
