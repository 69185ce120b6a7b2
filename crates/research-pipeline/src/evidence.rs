//! Per-run evidence index
//!
//! [`EvidenceStore`] embeds a run's documents into an in-memory vector index
//! and answers similarity queries against it. Each `build` produces a new,
//! independent index addressed by an [`IndexHandle`]; indexes are evicted by
//! age and by count, so a long-lived process does not accumulate them.

use async_trait::async_trait;
use cached::{Cached, TimedSizedCache};
use chrono::Utc;
use research_core::{Document, truncate_chars};
use research_llm::{EmbeddingProvider, EmbeddingRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default number of live indexes
pub const DEFAULT_REGISTRY_CAPACITY: usize = 64;

/// Default index lifetime
pub const DEFAULT_REGISTRY_TTL: Duration = Duration::from_secs(3600);

/// Default characters embedded per document
pub const DEFAULT_INDEX_TEXT_CHARS: usize = 3000;

#[derive(Debug, Error)]
pub enum EvidenceError {
    /// Nothing to index
    #[error("no documents with text to index")]
    Empty,

    #[error("embedding failed: {0}")]
    Embedding(String),
}

/// Maps texts to vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EvidenceError>;

    fn name(&self) -> &str;
}

/// Local bag-of-words embedder using feature hashing
///
/// Each lowercased alphanumeric term is hashed (djb2) into one of
/// `dimensions` buckets and its term frequency accumulated; the result is
/// L2-normalised. Deterministic and network free.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            vector[djb2(term) % self.dimensions] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(512)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EvidenceError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn name(&self) -> &'static str {
        "hashing"
    }
}

fn djb2(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

/// Embedder backed by a remote embedding model
pub struct ProviderEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    model: String,
}

impl ProviderEmbedder {
    /// An empty `model` lets the provider use its configured default
    pub fn new(provider: Arc<dyn EmbeddingProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

impl fmt::Debug for ProviderEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEmbedder")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EvidenceError> {
        let request = EmbeddingRequest::new(self.model.clone(), texts.to_vec());
        let response = self
            .provider
            .embed(request)
            .await
            .map_err(|e| EvidenceError::Embedding(e.to_string()))?;

        if response.embeddings.len() != texts.len() {
            return Err(EvidenceError::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

/// Cosine similarity; 0 for mismatched, empty or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Source of an indexed text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    pub url: String,
    pub title: String,
}

/// One search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceHit {
    pub text: String,
    pub metadata: EvidenceMetadata,
    pub score: f32,
}

impl EvidenceHit {
    pub fn into_document(self) -> Document {
        Document::new(self.metadata.url, self.metadata.title, self.text)
    }
}

/// Reference to a built index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexHandle {
    key: String,
    size: usize,
}

impl IndexHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of indexed documents
    pub fn size(&self) -> usize {
        self.size
    }
}

#[derive(Debug)]
struct IndexedText {
    text: String,
    metadata: EvidenceMetadata,
    vector: Vec<f32>,
}

#[derive(Debug, Default)]
struct VectorIndex {
    entries: Vec<IndexedText>,
}

impl VectorIndex {
    /// Entries ranked by decreasing similarity; ties keep insertion order
    fn rank(&self, query: &[f32], k: usize) -> Vec<EvidenceHit> {
        let mut hits: Vec<EvidenceHit> = self
            .entries
            .iter()
            .map(|entry| EvidenceHit {
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        hits
    }
}

/// Registry of evidence indexes shared by all runs of a process
pub struct EvidenceStore {
    embedder: Arc<dyn Embedder>,
    registry: RwLock<TimedSizedCache<String, Arc<VectorIndex>>>,
    counter: AtomicU64,
    index_text_chars: usize,
}

impl EvidenceStore {
    /// Store with the given embedder and default limits
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_limits(
            embedder,
            DEFAULT_REGISTRY_CAPACITY,
            DEFAULT_REGISTRY_TTL,
            DEFAULT_INDEX_TEXT_CHARS,
        )
    }

    /// Store keeping at most `capacity` indexes, each for at most `ttl`
    pub fn with_limits(
        embedder: Arc<dyn Embedder>,
        capacity: usize,
        ttl: Duration,
        index_text_chars: usize,
    ) -> Self {
        Self {
            embedder,
            registry: RwLock::new(TimedSizedCache::with_size_and_lifespan(
                capacity.max(1),
                ttl,
            )),
            counter: AtomicU64::new(0),
            index_text_chars: index_text_chars.max(1),
        }
    }

    /// Store using the local [`HashingEmbedder`]
    pub fn hashing() -> Self {
        Self::new(Arc::new(HashingEmbedder::default()))
    }

    /// Name of the embedder behind this store
    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    fn next_key(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("idx_{}_{seq}", Utc::now().timestamp_millis())
    }

    /// Embed `docs` into a new index
    ///
    /// Each text is cut to the configured number of characters first;
    /// documents left blank by the cut are skipped.
    pub async fn build(&self, docs: &[Document]) -> Result<IndexHandle, EvidenceError> {
        let (texts, metadata): (Vec<String>, Vec<EvidenceMetadata>) = docs
            .iter()
            .filter_map(|doc| {
                let text = truncate_chars(&doc.text, self.index_text_chars);
                if text.trim().is_empty() {
                    return None;
                }
                let metadata = EvidenceMetadata {
                    url: doc.url.clone(),
                    title: doc.title.clone(),
                };
                Some((text.to_string(), metadata))
            })
            .unzip();

        if texts.is_empty() {
            return Err(EvidenceError::Empty);
        }

        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(EvidenceError::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let entries: Vec<IndexedText> = texts
            .into_iter()
            .zip(metadata)
            .zip(vectors)
            .map(|((text, metadata), vector)| IndexedText {
                text,
                metadata,
                vector,
            })
            .collect();

        let handle = IndexHandle {
            key: self.next_key(),
            size: entries.len(),
        };
        let mut registry = self.registry.write().await;
        registry.cache_set(handle.key.clone(), Arc::new(VectorIndex { entries }));

        debug!(key = %handle.key, size = handle.size, embedder = self.embedder.name(), "Built evidence index");
        Ok(handle)
    }

    /// Up to `k` entries most similar to `query`
    ///
    /// An evicted or unknown handle yields no hits.
    pub async fn search(&self, handle: &IndexHandle, query: &str, k: usize) -> Vec<EvidenceHit> {
        if k == 0 {
            return Vec::new();
        }

        let index = {
            let mut registry = self.registry.write().await;
            registry.cache_get(&handle.key).cloned()
        };
        let Some(index) = index else {
            debug!(key = %handle.key, "Evidence index not found");
            return Vec::new();
        };

        let query_vector = match self.embedder.embed(&[query.to_string()]).await {
            Ok(mut vectors) if vectors.len() == 1 => vectors.remove(0),
            Ok(_) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Query embedding failed");
                return Vec::new();
            }
        };

        index.rank(&query_vector, k)
    }

    /// Drop an index; returns whether it was present
    pub async fn evict(&self, handle: &IndexHandle) -> bool {
        let mut registry = self.registry.write().await;
        registry.cache_remove(&handle.key).is_some()
    }

    pub async fn contains(&self, handle: &IndexHandle) -> bool {
        let mut registry = self.registry.write().await;
        registry.cache_get(&handle.key).is_some()
    }

    /// Number of indexes held (expired ones may linger until touched)
    pub async fn len(&self) -> usize {
        self.registry.read().await.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl fmt::Debug for EvidenceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvidenceStore")
            .field("embedder", &self.embedder.name())
            .field("index_text_chars", &self.index_text_chars)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use research_llm::providers::OfflineProvider;
    use std::collections::HashSet;

    fn doc(url: &str, title: &str, text: &str) -> Document {
        Document::new(url, title, text)
    }

    fn corpus() -> Vec<Document> {
        vec![
            doc("https://a", "Weather", "Rain and wind expected across the coast this weekend"),
            doc(
                "https://b",
                "NVIDIA data center",
                "NVIDIA data center revenue grew on demand for GPUs in AI data centers",
            ),
            doc("https://c", "Recipes", "How to bake sourdough bread at home"),
        ]
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EvidenceError> {
            Err(EvidenceError::Embedding("model unavailable".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_hashing_embedder_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_one("NVIDIA data center growth");
        let b = embedder.embed_one("NVIDIA data center growth");

        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(embedder.embed_one("").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_ranks_relevant_document_first() {
        let store = EvidenceStore::hashing();
        let handle = store.build(&corpus()).await.unwrap();
        assert_eq!(handle.size(), 3);

        let hits = store.search(&handle, "NVIDIA data center outlook", 2).await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.url, "https://b");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_search_is_deterministic_and_ties_keep_insertion_order() {
        let store = EvidenceStore::hashing();
        let docs = vec![
            doc("https://first", "One", "identical text about chips"),
            doc("https://second", "Two", "identical text about chips"),
        ];
        let handle = store.build(&docs).await.unwrap();

        let first = store.search(&handle, "chips", 2).await;
        let second = store.search(&handle, "chips", 2).await;
        assert_eq!(first, second);
        assert_eq!(first[0].metadata.url, "https://first");
        assert_eq!(first[1].metadata.url, "https://second");
    }

    #[tokio::test]
    async fn test_blank_documents_are_skipped() {
        let store = EvidenceStore::hashing();
        let docs = vec![
            Document::failed("https://dead", "timeout"),
            doc("https://live", "Live", "some text"),
            doc("https://ws", "Blank", "   \n "),
        ];
        let handle = store.build(&docs).await.unwrap();
        assert_eq!(handle.size(), 1);
    }

    #[tokio::test]
    async fn test_whitespace_prefix_longer_than_cut_is_blank() {
        let store = EvidenceStore::with_limits(
            Arc::new(HashingEmbedder::default()),
            4,
            DEFAULT_REGISTRY_TTL,
            10,
        );
        let padded = doc("https://a", "A", &format!("{}real content", " ".repeat(20)));
        assert!(matches!(
            store.build(std::slice::from_ref(&padded)).await,
            Err(EvidenceError::Empty)
        ));

        let docs = vec![padded, doc("https://b", "B", "real content")];
        let handle = store.build(&docs).await.unwrap();
        assert_eq!(handle.size(), 1);
        let hits = store.search(&handle, "content", 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.url, "https://b");
    }

    #[tokio::test]
    async fn test_empty_input_is_an_error() {
        let store = EvidenceStore::hashing();
        assert!(matches!(store.build(&[]).await, Err(EvidenceError::Empty)));
        let blank = vec![Document::failed("https://x", "404")];
        assert!(matches!(store.build(&blank).await, Err(EvidenceError::Empty)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_text_is_cut_before_indexing() {
        let store = EvidenceStore::with_limits(
            Arc::new(HashingEmbedder::default()),
            4,
            DEFAULT_REGISTRY_TTL,
            10,
        );
        let handle = store
            .build(&[doc("https://a", "A", "0123456789abcdefghij")])
            .await
            .unwrap();
        let hits = store.search(&handle, "anything", 1).await;
        assert_eq!(hits[0].text, "0123456789");
    }

    #[tokio::test]
    async fn test_unknown_or_evicted_handle_yields_nothing() {
        let store = EvidenceStore::hashing();
        let handle = store.build(&corpus()).await.unwrap();
        assert!(store.contains(&handle).await);

        assert!(store.evict(&handle).await);
        assert!(!store.evict(&handle).await);
        assert!(store.search(&handle, "NVIDIA", 3).await.is_empty());

        let other = EvidenceStore::hashing();
        let foreign = other.build(&corpus()).await.unwrap();
        let _ = store.build(&corpus()).await.unwrap();
        let unknown = IndexHandle {
            key: "idx_0_999".to_string(),
            size: 3,
        };
        assert!(store.search(&unknown, "NVIDIA", 3).await.is_empty());
        assert!(store.search(&foreign, "NVIDIA", 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_bounds_registry() {
        let store = EvidenceStore::with_limits(
            Arc::new(HashingEmbedder::default()),
            2,
            DEFAULT_REGISTRY_TTL,
            DEFAULT_INDEX_TEXT_CHARS,
        );
        let mut handles = Vec::new();
        for _ in 0..5 {
            handles.push(store.build(&corpus()).await.unwrap());
        }

        assert_eq!(store.len().await, 2);
        assert!(!store.contains(&handles[0]).await);
        assert!(store.contains(&handles[4]).await);
    }

    #[tokio::test]
    async fn test_keys_are_unique_across_rapid_builds() {
        let store = EvidenceStore::with_limits(
            Arc::new(HashingEmbedder::new(16)),
            256,
            DEFAULT_REGISTRY_TTL,
            DEFAULT_INDEX_TEXT_CHARS,
        );
        let docs = vec![doc("https://a", "A", "text")];
        let mut keys = HashSet::new();
        for _ in 0..100 {
            let handle = store.build(&docs).await.unwrap();
            assert!(handle.key().starts_with("idx_"));
            keys.insert(handle.key().to_string());
        }
        assert_eq!(keys.len(), 100);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_reported() {
        let store = EvidenceStore::new(Arc::new(FailingEmbedder));
        let result = store.build(&corpus()).await;
        assert!(matches!(result, Err(EvidenceError::Embedding(_))));

        let store = EvidenceStore::new(Arc::new(ProviderEmbedder::new(
            Arc::new(OfflineProvider::new("offline")),
            "",
        )));
        assert!(matches!(
            store.build(&corpus()).await,
            Err(EvidenceError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn test_hit_converts_to_document() {
        let store = EvidenceStore::hashing();
        let handle = store.build(&corpus()).await.unwrap();
        let hit = store.search(&handle, "sourdough bread", 1).await.remove(0);
        let document = hit.into_document();
        assert_eq!(document.url, "https://c");
        assert_eq!(document.title, "Recipes");
        assert!(document.error.is_none());
    }
}
