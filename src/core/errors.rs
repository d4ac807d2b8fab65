use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),
    #[error("embedding provider error: {0}")]
    Provider(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl KnowledgeError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        KnowledgeError::Internal(err.to_string())
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        KnowledgeError::Storage(err.to_string())
    }

    pub fn provider<E: std::fmt::Display>(err: E) -> Self {
        KnowledgeError::Provider(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KnowledgeError>;
