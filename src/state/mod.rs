use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, KnowledgeSettings, StorageBackend};
use crate::core::errors::KnowledgeError;
use crate::embedding::{
    CachedEmbeddingProvider, EmbeddingProvider, MemoryEmbeddingCache, OpenAiEmbeddingProvider,
    SqliteEmbeddingCache,
};
use crate::engine::KnowledgeBase;
use crate::store::{DocumentStore, MemoryDocumentStore, SqliteDocumentStore};

pub mod error;

use error::InitializationError;

/// Application state shared by whatever hosts the knowledge base.
///
/// Contains references to:
/// - Configuration and paths
/// - The settings the engine was built from
/// - The knowledge base (store backend, embedding index, provider)
#[derive(Clone)]
pub struct KnowledgeState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<KnowledgeSettings>,
    pub knowledge: Arc<KnowledgeBase>,
}

impl KnowledgeState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Setting up paths and loading configuration
    /// 2. Creating the embedding provider
    /// 3. Opening the configured store backend and wiring the embedding cache
    /// 4. Rebuilding the embedding index from durable storage
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        Self::initialize_with_paths(Arc::new(AppPaths::new())).await
    }

    pub async fn initialize_with_paths(
        paths: Arc<AppPaths>,
    ) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(InitializationError::Config)?;
        tracing::debug!(
            "Loaded settings: {}",
            config.redact_sensitive_values(&serde_json::to_value(&settings).unwrap_or_default())
        );

        let provider = OpenAiEmbeddingProvider::new(&settings.embedding)
            .map_err(InitializationError::Provider)?;

        Self::with_components(paths, settings, Arc::new(provider)).await
    }

    /// Builds the state around an already constructed provider.
    pub async fn with_components(
        paths: Arc<AppPaths>,
        settings: KnowledgeSettings,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Arc<Self>, InitializationError> {
        paths.ensure_dirs().map_err(InitializationError::Storage)?;
        let config = ConfigService::new(paths.clone());
        let use_cache = settings.embedding.cache;

        let (store, provider): (Arc<dyn DocumentStore>, Arc<dyn EmbeddingProvider>) =
            match settings.storage.backend {
                StorageBackend::Memory => {
                    let provider: Arc<dyn EmbeddingProvider> = if use_cache {
                        Arc::new(CachedEmbeddingProvider::new(
                            provider,
                            Arc::new(MemoryEmbeddingCache::new()),
                        ))
                    } else {
                        provider
                    };
                    (Arc::new(MemoryDocumentStore::new()), provider)
                }
                StorageBackend::Sqlite => {
                    let store = SqliteDocumentStore::new(&paths)
                        .await
                        .map_err(InitializationError::Storage)?;
                    record_embedding_model(&store, provider.model())
                        .await
                        .map_err(InitializationError::Storage)?;

                    let provider: Arc<dyn EmbeddingProvider> = if use_cache {
                        let cache = SqliteEmbeddingCache::new(&store, provider.model());
                        Arc::new(CachedEmbeddingProvider::new(provider, Arc::new(cache)))
                    } else {
                        provider
                    };
                    (Arc::new(store), provider)
                }
            };

        let knowledge = KnowledgeBase::new(store, provider, settings.chunking.clone())
            .map_err(InitializationError::Config)?
            .with_concurrency(settings.embedding.concurrency)
            .with_default_top_k(settings.search.default_top_k);

        if settings.storage.backend == StorageBackend::Sqlite && settings.storage.reload_on_start {
            knowledge
                .reload_index_from_storage()
                .await
                .map_err(InitializationError::Index)?;
        }

        tracing::info!(
            "Knowledge base ready (backend: {}, model: {})",
            settings.storage.backend.as_str(),
            knowledge.provider().model()
        );

        Ok(Arc::new(KnowledgeState {
            paths,
            config,
            settings: Arc::new(settings),
            knowledge: Arc::new(knowledge),
        }))
    }
}

/// Stores the active embedding model, warning when it differs from the one
/// the stored chunks were last indexed with.
async fn record_embedding_model(
    store: &SqliteDocumentStore,
    model: &str,
) -> Result<(), KnowledgeError> {
    match store.embedding_model().await? {
        Some(previous) if previous == model => return Ok(()),
        Some(previous) => tracing::warn!(
            "Embedding model changed from {} to {}; stored chunks are re-embedded on reload",
            previous,
            model
        ),
        None => {}
    }
    store.set_embedding_model(model).await
}
