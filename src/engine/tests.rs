use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::*;
use crate::store::{MemoryDocumentStore, SqliteDocumentStore, StoreCounts};

/// Letter-frequency embeddings: deterministic and easy to reason about.
struct LetterProvider {
    calls: AtomicUsize,
    fail_from_call: AtomicUsize,
    padding: AtomicUsize,
    poisoned: AtomicBool,
    delay_ms: u64,
}

impl LetterProvider {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from_call: AtomicUsize::new(usize::MAX),
            padding: AtomicUsize::new(0),
            poisoned: AtomicBool::new(false),
            delay_ms: 0,
        }
    }

    /// Earlier calls finish later, so completion order is reversed.
    fn delayed(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail_from(&self, call: usize) {
        self.fail_from_call.store(call, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for LetterProvider {
    fn name(&self) -> &str {
        "letters"
    }

    fn model(&self) -> &str {
        "letters-v1"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_from_call.load(Ordering::SeqCst) {
            return Err(KnowledgeError::Provider("quota exhausted".to_string()));
        }
        if self.delay_ms > 0 {
            let factor = 10u64.saturating_sub(call as u64);
            tokio::time::sleep(Duration::from_millis(self.delay_ms * factor)).await;
        }

        let mut vector = vec![0.0f32; 26 + self.padding.load(Ordering::SeqCst)];
        for byte in text.bytes().filter(u8::is_ascii_alphabetic) {
            vector[(byte.to_ascii_lowercase() - b'a') as usize] += 1.0;
        }
        if self.poisoned.load(Ordering::SeqCst) {
            vector[0] = f32::NAN;
        }
        Ok(vector)
    }
}

/// Memory store with slow writes and slower full scans.
struct SlowStore {
    inner: MemoryDocumentStore,
}

impl SlowStore {
    fn new() -> Self {
        Self {
            inner: MemoryDocumentStore::new(),
        }
    }
}

#[async_trait]
impl DocumentStore for SlowStore {
    fn backend(&self) -> StorageBackend {
        self.inner.backend()
    }

    async fn insert_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
    ) -> Result<(), KnowledgeError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.inner.insert_document(document, chunks).await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, KnowledgeError> {
        self.inner.get_document(id).await
    }

    async fn list_documents(&self) -> Result<Vec<Document>, KnowledgeError> {
        self.inner.list_documents().await
    }

    async fn delete_document(&self, id: &str) -> Result<bool, KnowledgeError> {
        self.inner.delete_document(id).await
    }

    async fn clear(&self) -> Result<usize, KnowledgeError> {
        self.inner.clear().await
    }

    async fn get_chunk(
        &self,
        document_id: &str,
        chunk_index: usize,
    ) -> Result<Option<Chunk>, KnowledgeError> {
        self.inner.get_chunk(document_id, chunk_index).await
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>, KnowledgeError> {
        self.inner.get_chunks(document_id).await
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>, KnowledgeError> {
        let chunks = self.inner.all_chunks().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        chunks
    }

    async fn count(&self) -> Result<StoreCounts, KnowledgeError> {
        self.inner.count().await
    }
}

fn chunking(chunk_size: usize, chunk_overlap: usize) -> ChunkingSettings {
    ChunkingSettings {
        chunk_size,
        chunk_overlap,
    }
}

fn memory_kb(provider: Arc<LetterProvider>) -> KnowledgeBase {
    KnowledgeBase::new(
        Arc::new(MemoryDocumentStore::new()),
        provider,
        chunking(10, 3),
    )
    .unwrap()
}

fn alphabet(len: usize) -> String {
    (0..len)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect()
}

async fn sqlite_store() -> Arc<SqliteDocumentStore> {
    let path = std::env::temp_dir().join(format!(
        "tepora-knowledge-engine-test-{}.db",
        uuid::Uuid::new_v4()
    ));
    Arc::new(SqliteDocumentStore::with_path(path).await.unwrap())
}

#[test]
fn invalid_geometry_is_rejected() {
    let result = KnowledgeBase::new(
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(LetterProvider::new()),
        chunking(5, 5),
    );
    assert!(matches!(result, Err(KnowledgeError::InvalidConfig(_))));
}

#[tokio::test]
async fn add_document_stores_both_geometries() {
    let kb = memory_kb(Arc::new(LetterProvider::new()));
    let text = alphabet(25);

    let doc = kb.add_document(&text, None).await.unwrap();
    assert_eq!(doc.number_of_chunks, 3);

    let chunk = kb.get_chunk_by_index(&doc.id, 1).await.unwrap().unwrap();
    assert_eq!(chunk.content, text[7..20]);
    assert_eq!((chunk.range.start, chunk.range.end), (10, 20));
    assert!(kb.get_chunk_by_index(&doc.id, 3).await.unwrap().is_none());

    let mut rebuilt = String::new();
    for i in 0..doc.number_of_chunks {
        let chunk = kb.get_chunk_by_index(&doc.id, i).await.unwrap().unwrap();
        rebuilt.push_str(&doc.content[chunk.range.start..chunk.range.end]);
    }
    assert_eq!(rebuilt, text);

    let stats = kb.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 3);
    assert_eq!(stats.indexed_entries, 3);
    assert_eq!(stats.dimension, Some(26));
}

#[tokio::test]
async fn metadata_is_kept() {
    let kb = memory_kb(Arc::new(LetterProvider::new()));
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), serde_json::json!("notes.md"));

    let doc = kb.add_document("short", Some(metadata.clone())).await.unwrap();
    let stored = kb.get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(stored.metadata, metadata);
}

#[tokio::test]
async fn search_ranks_bounds_and_pages() {
    let kb = memory_kb(Arc::new(LetterProvider::new()));
    let apple = kb.add_document("apple apple apple", None).await.unwrap();
    kb.add_document("banana bandana", None).await.unwrap();
    kb.add_document("cherry cherry", None).await.unwrap();

    let hits = kb.search("apple", 2, 0).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].document_id, apple.id);
    assert!(hits[0].similarity >= hits[1].similarity);

    let full = kb.search("apple", 100, 0).await.unwrap();
    for pair in full.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
    for skip in 0..4 {
        for k in 0..4 {
            let page = kb.search("apple", k, skip).await.unwrap();
            let wide = kb.search("apple", k + skip, 0).await.unwrap();
            assert!(page.len() <= k);
            assert_eq!(page, wide.into_iter().skip(skip).collect::<Vec<_>>());
        }
    }
}

#[tokio::test]
async fn searching_an_empty_index_does_not_embed() {
    let provider = Arc::new(LetterProvider::new());
    let kb = memory_kb(provider.clone());

    assert!(kb.search("anything", 5, 0).await.unwrap().is_empty());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn provider_failure_leaves_nothing_behind() {
    let provider = Arc::new(LetterProvider::new());
    provider.fail_from(1);
    let kb = memory_kb(provider.clone());

    let err = kb.add_document(&alphabet(25), None).await.unwrap_err();
    assert!(matches!(err, KnowledgeError::Provider(_)));

    assert!(kb.get_all_documents().await.unwrap().is_empty());
    let stats = kb.stats().await.unwrap();
    assert_eq!(stats.chunks, 0);
    assert_eq!(stats.indexed_entries, 0);
}

#[tokio::test]
async fn vectors_of_another_dimension_are_rejected() {
    let provider = Arc::new(LetterProvider::new());
    let kb = memory_kb(provider.clone());
    kb.add_document("first document", None).await.unwrap();

    provider.padding.store(4, Ordering::SeqCst);
    let err = kb.add_document("second document", None).await.unwrap_err();
    assert!(matches!(
        err,
        KnowledgeError::DimensionMismatch {
            expected: 26,
            actual: 30
        }
    ));
    assert_eq!(kb.get_all_documents().await.unwrap().len(), 1);
}

#[tokio::test]
async fn non_finite_embeddings_are_rejected_before_storing() {
    let provider = Arc::new(LetterProvider::new());
    let kb = memory_kb(provider.clone());
    kb.add_document("healthy", None).await.unwrap();

    provider.poisoned.store(true, Ordering::SeqCst);
    let err = kb.add_document(&alphabet(25), None).await.unwrap_err();
    assert!(matches!(err, KnowledgeError::InvalidEmbedding(_)));
    assert!(matches!(
        kb.search("healthy", 3, 0).await,
        Err(KnowledgeError::InvalidEmbedding(_))
    ));
    assert!(kb.reload_index_from_storage().await.is_err());

    let stats = kb.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.indexed_entries, stats.chunks);

    provider.poisoned.store(false, Ordering::SeqCst);
    assert_eq!(kb.search("healthy", 3, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn default_search_uses_the_configured_count() {
    let kb = memory_kb(Arc::new(LetterProvider::new())).with_default_top_k(2);
    kb.add_document(&alphabet(40), None).await.unwrap();

    let hits = kb.search_default("abc").await.unwrap();
    assert_eq!(hits, kb.search("abc", 2, 0).await.unwrap());
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn concurrent_embedding_keeps_partition_order() {
    let provider = Arc::new(LetterProvider::delayed(3));
    let kb = KnowledgeBase::new(
        Arc::new(MemoryDocumentStore::new()),
        provider,
        chunking(5, 0),
    )
    .unwrap()
    .with_concurrency(4);

    let doc = kb
        .add_document("aaaaabbbbbcccccdddddeeeeefffff", None)
        .await
        .unwrap();
    assert_eq!(doc.number_of_chunks, 6);

    for i in 0..doc.number_of_chunks {
        let chunk = kb.get_chunk_by_index(&doc.id, i).await.unwrap().unwrap();
        let hits = kb.search(&chunk.content, 1, 0).await.unwrap();
        assert_eq!(hits[0].chunk_index, i);
        assert_eq!(hits[0].text, chunk.content);
    }
}

#[tokio::test]
async fn deleted_documents_never_appear_in_search() {
    let kb = memory_kb(Arc::new(LetterProvider::new()));
    let gone = kb.add_document("zebra zebra zebra zebra", None).await.unwrap();
    kb.add_document("zebu and other cattle", None).await.unwrap();

    assert!(kb.delete_document(&gone.id).await.unwrap());
    assert!(!kb.delete_document(&gone.id).await.unwrap());

    let hits = kb.search("zebra", 10, 0).await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|hit| hit.document_id != gone.id));
    assert!(kb.get_document(&gone.id).await.unwrap().is_none());
}

#[tokio::test]
async fn clear_removes_everything() {
    let kb = memory_kb(Arc::new(LetterProvider::new()));
    kb.add_document("one", None).await.unwrap();
    kb.add_document("two", None).await.unwrap();

    assert_eq!(kb.clear_all_documents().await.unwrap(), 2);
    let stats = kb.stats().await.unwrap();
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.indexed_entries, 0);
    assert_eq!(stats.dimension, None);
}

#[tokio::test]
async fn render_reports_missing_documents_in_request_order() {
    let kb = memory_kb(Arc::new(LetterProvider::new()));
    let text = alphabet(25);
    let doc = kb.add_document(&text, None).await.unwrap();

    let rendered = kb
        .render(&[
            ChunkRangeRequest::new("missing", 0, 0),
            ChunkRangeRequest::new(doc.id.clone(), 0, 99),
        ])
        .await
        .unwrap();

    assert_eq!(rendered.len(), 2);
    assert_eq!(
        rendered[0],
        RenderedDocument::NotFound {
            document_id: "missing".to_string()
        }
    );
    assert_eq!(rendered[1].document_id(), doc.id);
    assert_eq!(
        rendered[1].spans(),
        &[crate::render::RenderedSpan::Shown {
            start: 0,
            end: 2,
            text,
        }]
    );
}

#[tokio::test]
async fn noop_edit_leaves_the_document_alone() {
    let kb = memory_kb(Arc::new(LetterProvider::new()));
    let doc = kb.add_document(&alphabet(25), None).await.unwrap();

    let outcome = kb
        .edit_chunk(&doc.id, 0, 2, "not present", "x")
        .await
        .unwrap();
    assert_eq!(outcome, Err(EditFailure::NoOp));
    assert_eq!(kb.get_document(&doc.id).await.unwrap(), Some(doc));
}

#[tokio::test]
async fn edit_replaces_the_document() {
    let kb = memory_kb(Arc::new(LetterProvider::new()));
    let mut metadata = Metadata::new();
    metadata.insert("title".to_string(), serde_json::json!("pets"));
    let doc = kb
        .add_document("the cat sat on the cat mat", Some(metadata.clone()))
        .await
        .unwrap();

    // chunks 1..=2 cover "t on the cat mat"
    let edited = kb
        .edit_chunk(&doc.id, 1, 2, "cat", "dog")
        .await
        .unwrap()
        .unwrap();

    assert_ne!(edited.id, doc.id);
    assert_eq!(edited.content, "the cat sat on the dog mat");
    assert_eq!(edited.metadata, metadata);
    assert!(kb.get_document(&doc.id).await.unwrap().is_none());

    let hits = kb.search("dog", 10, 0).await.unwrap();
    assert!(hits.iter().all(|hit| hit.document_id == edited.id));
    assert_eq!(kb.get_all_documents().await.unwrap(), vec![edited]);
}

#[tokio::test]
async fn edit_reports_missing_targets() {
    let kb = memory_kb(Arc::new(LetterProvider::new()));
    let doc = kb.add_document(&alphabet(25), None).await.unwrap();

    assert_eq!(
        kb.edit_chunk("nope", 0, 0, "a", "b").await.unwrap(),
        Err(EditFailure::NotFound(Missing::Document))
    );
    assert_eq!(
        kb.edit_chunk(&doc.id, 1, 3, "a", "b").await.unwrap(),
        Err(EditFailure::NotFound(Missing::Chunk(3)))
    );
}

#[tokio::test]
async fn failed_edit_keeps_the_original() {
    let provider = Arc::new(LetterProvider::new());
    let kb = memory_kb(provider.clone());
    let doc = kb.add_document(&alphabet(25), None).await.unwrap();

    provider.fail_from(provider.calls());
    let err = kb.edit_chunk(&doc.id, 0, 0, "abc", "xyz").await.unwrap_err();

    assert!(matches!(err, KnowledgeError::Provider(_)));
    assert_eq!(kb.get_all_documents().await.unwrap(), vec![doc]);
}

#[tokio::test]
async fn edits_of_one_document_are_serialized() {
    let kb = Arc::new(memory_kb(Arc::new(LetterProvider::new())));
    let doc = kb.add_document(&alphabet(25), None).await.unwrap();

    let tasks: Vec<_> = ["x", "y"]
        .into_iter()
        .map(|replacement| {
            let kb = kb.clone();
            let id = doc.id.clone();
            tokio::spawn(async move { kb.edit_chunk(&id, 0, 0, "abc", replacement).await })
        })
        .collect();

    let mut applied = 0;
    let mut missing = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            Ok(_) => applied += 1,
            Err(EditFailure::NotFound(Missing::Document)) => missing += 1,
            Err(other) => panic!("unexpected edit outcome: {other}"),
        }
    }
    assert_eq!((applied, missing), (1, 1));
    assert_eq!(kb.get_all_documents().await.unwrap().len(), 1);
}

#[tokio::test]
async fn reload_rebuilds_the_index_from_durable_chunks() {
    let store = sqlite_store().await;
    let first = KnowledgeBase::new(
        store.clone(),
        Arc::new(LetterProvider::new()),
        chunking(10, 3),
    )
    .unwrap();
    let doc = first.add_document(&alphabet(25), None).await.unwrap();
    let quokka = first.add_document("quiet quokka", None).await.unwrap();
    drop(first);

    let restarted = KnowledgeBase::new(
        store.clone(),
        Arc::new(LetterProvider::new()),
        chunking(10, 3),
    )
    .unwrap();
    assert!(restarted.search("quokka", 5, 0).await.unwrap().is_empty());

    assert_eq!(restarted.reload_index_from_storage().await.unwrap(), 5);
    let hits = restarted.search("quokka", 1, 0).await.unwrap();
    assert_eq!(hits[0].document_id, quokka.id);

    let stats = restarted.stats().await.unwrap();
    assert_eq!(stats.backend, StorageBackend::Sqlite);
    assert_eq!(stats.indexed_entries, 5);
    assert!(restarted.get_document(&doc.id).await.unwrap().is_some());
}

#[tokio::test]
async fn failed_reload_keeps_the_current_index() {
    let provider = Arc::new(LetterProvider::new());
    let kb = memory_kb(provider.clone());
    kb.add_document(&alphabet(25), None).await.unwrap();

    provider.fail_from(provider.calls() + 1);
    assert!(kb.reload_index_from_storage().await.is_err());
    assert_eq!(kb.stats().await.unwrap().indexed_entries, 3);
}

#[tokio::test]
async fn reload_during_an_addition_indexes_each_chunk_once() {
    for reload_first in [false, true] {
        let kb = KnowledgeBase::new(
            Arc::new(SlowStore::new()),
            Arc::new(LetterProvider::new()),
            chunking(10, 3),
        )
        .unwrap();
        kb.add_document(&alphabet(25), None).await.unwrap();

        let (added, reloaded) = if reload_first {
            let (reloaded, added) = tokio::join!(
                kb.reload_index_from_storage(),
                kb.add_document("quiet quokka", None)
            );
            (added, reloaded)
        } else {
            tokio::join!(
                kb.add_document("quiet quokka", None),
                kb.reload_index_from_storage()
            )
        };
        let quokka = added.unwrap();
        reloaded.unwrap();

        let stats = kb.stats().await.unwrap();
        assert_eq!(stats.chunks, 5, "reload_first={reload_first}");
        assert_eq!(stats.indexed_entries, 5, "reload_first={reload_first}");

        let hits = kb.search("quokka", 10, 0).await.unwrap();
        let distinct: HashSet<(String, usize)> = hits
            .iter()
            .map(|hit| (hit.document_id.clone(), hit.chunk_index))
            .collect();
        assert_eq!(distinct.len(), hits.len(), "reload_first={reload_first}");
        assert_eq!(hits[0].document_id, quokka.id);
    }
}
