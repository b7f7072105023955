//! Shared fixtures for library-level tests: fake embedding providers and a
//! small nomenclature sample.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ncm_search::embed_cmd::embed_pending;
use ncm_search::embedding::{Embedder, EmbeddingProvider};
use ncm_search::error::EmbeddingError;
use ncm_search::models::NomenclatureEntry;
use ncm_search::search::{SearchEngine, SearchSettings};
use ncm_search::store::{InMemoryStore, NomenclatureStore};

/// Deterministic provider: one axis per topic keyword.
///
/// Texts mentioning the same topics get near-identical vectors, so
/// "laptop" lands next to "portable computers".
pub struct KeywordProvider {
    pub calls: AtomicUsize,
}

impl KeywordProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let t = text.to_lowercase();
    let mut v = vec![0.05f32, 0.05, 0.05, 0.05];
    if t.contains("laptop") || t.contains("computer") || t.contains("notebook") {
        v[0] += 1.0;
    }
    if t.contains("other") {
        v[1] += 0.3;
    }
    if t.contains("coffee") {
        v[2] += 1.0;
    }
    if t.contains("horse") {
        v[3] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    fn model_name(&self) -> &str {
        "keyword-test"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Provider whose upstream is down.
pub struct DownProvider;

#[async_trait]
impl EmbeddingProvider for DownProvider {
    fn model_name(&self) -> &str {
        "down"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Network("connection refused".to_string()))
    }
}

/// Provider that never answers within any reasonable deadline.
pub struct HangingProvider;

#[async_trait]
impl EmbeddingProvider for HangingProvider {
    fn model_name(&self) -> &str {
        "hanging"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

pub fn entry(code: &str, description: &str) -> NomenclatureEntry {
    NomenclatureEntry::new(code, description, None).unwrap()
}

pub fn sample_entries() -> Vec<NomenclatureEntry> {
    vec![
        entry("8471.30.12", "Portable computers"),
        entry("8471.30.19", "Other portable computers"),
        entry("8471.41.00", "Other automatic data processing machines"),
        entry("0901.21.00", "Roasted coffee, not decaffeinated"),
        entry("0101.21.00", "Pure-bred breeding horses"),
    ]
}

/// An in-memory store holding `entries`, embedded with [`KeywordProvider`].
pub async fn embedded_store(entries: &[NomenclatureEntry]) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.insert_entries(entries).await.unwrap();
    let embedder = Embedder::with_limits(KeywordProvider::new(), 500, 1);
    let report = embed_pending(store.as_ref(), &embedder, None).await.unwrap();
    assert_eq!(report.failed, 0);
    store
}

pub fn engine_with(
    store: Arc<InMemoryStore>,
    provider: Arc<dyn EmbeddingProvider>,
    settings: SearchSettings,
) -> SearchEngine {
    let store: Arc<dyn NomenclatureStore> = store;
    SearchEngine::new(store, Embedder::with_limits(provider, 500, 1), settings)
}
