use thiserror::Error;

use crate::core::errors::KnowledgeError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] KnowledgeError),

    #[error("Failed to open document store: {0}")]
    Storage(#[source] KnowledgeError),

    #[error("Failed to initialize embedding provider: {0}")]
    Provider(#[source] KnowledgeError),

    #[error("Failed to rebuild embedding index: {0}")]
    Index(#[source] KnowledgeError),
}
