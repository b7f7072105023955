use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, ChunkOutcome, Embedder};
use crate::store::{NomenclatureStore, SqliteStore};

/// Counts from one embedding pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EmbedReport {
    pub pending: usize,
    pub embedded: usize,
    pub failed: usize,
}

/// Embed entries that have no vector, a stale vector, or one from another model.
///
/// Failed chunks are retried once; whatever still fails is reported and
/// left pending for the next run.
pub async fn embed_pending(
    store: &dyn NomenclatureStore,
    embedder: &Embedder,
    limit: Option<usize>,
) -> Result<EmbedReport> {
    let model = embedder.provider().model_name().to_string();
    let pending = store.pending_embeddings(&model, limit).await?;
    if pending.is_empty() {
        return Ok(EmbedReport::default());
    }

    let texts: Vec<String> = pending.iter().map(|p| p.description.clone()).collect();
    let mut batch = embedder.embed_chunks(&texts).await;

    if !batch.is_complete() {
        let failed = batch.failed_chunks();
        tracing::warn!(chunks = ?failed, "embedding chunks failed, retrying once");
        batch.retry_failed(embedder).await;
    }

    for slot in batch.slots() {
        if let ChunkOutcome::Failed(e) = &slot.outcome {
            tracing::warn!(
                start = slot.range.start,
                end = slot.range.end,
                error = %e,
                "embedding failed for entries"
            );
        }
    }

    let mut embedded = 0usize;
    for (range, vectors) in batch.completed() {
        for (item, vector) in pending[range].iter().zip(vectors) {
            store
                .upsert_embedding(&item.code, vector, &model, &item.description_hash)
                .await?;
            embedded += 1;
        }
    }

    Ok(EmbedReport {
        pending: pending.len(),
        embedded,
        failed: pending.len() - embedded,
    })
}

fn open_embedder(config: &Config) -> Result<Embedder> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    let provider = create_provider(&config.embedding)?;
    Ok(Embedder::new(provider, &config.embedding))
}

/// Find and embed entries that are missing or have stale embeddings.
pub async fn run_embed_pending(config: &Config, limit: Option<usize>, dry_run: bool) -> Result<()> {
    let embedder = open_embedder(config)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    if dry_run {
        let model = embedder.provider().model_name();
        let pending = store.pending_embeddings(model, limit).await?;
        println!("embed pending (dry-run)");
        println!("  entries needing embeddings: {}", pending.len());
        store.pool().close().await;
        return Ok(());
    }

    let report = embed_pending(&store, &embedder, limit).await?;

    println!("embed pending");
    if report.pending == 0 {
        println!("  all entries up to date");
    } else {
        println!("  total pending: {}", report.pending);
        println!("  embedded: {}", report.embedded);
        println!("  failed: {}", report.failed);
    }

    store.pool().close().await;
    Ok(())
}

/// Delete every stored vector and embed the whole index again.
pub async fn run_embed_rebuild(config: &Config) -> Result<()> {
    let embedder = open_embedder(config)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let cleared = store.clear_embeddings().await?;
    println!("embed rebuild: cleared {} embeddings", cleared);

    let report = embed_pending(&store, &embedder, None).await?;
    println!("embed rebuild");
    println!("  total entries: {}", report.pending);
    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.failed);

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::error::EmbeddingError;
    use crate::models::NomenclatureEntry;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Embeds each text as `[len, 1.0]`; fails the first `fail_first` calls.
    struct FlakyProvider {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_first {
                return Err(EmbeddingError::Http {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    async fn seeded_store(n: usize) -> InMemoryStore {
        let store = InMemoryStore::new();
        let entries: Vec<NomenclatureEntry> = (0..n)
            .map(|i| {
                NomenclatureEntry::new(&format!("8471.{:02}.00", i), &format!("item {}", i), None)
                    .unwrap()
            })
            .collect();
        store.insert_entries(&entries).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_embed_pending_then_nothing_left() {
        let store = seeded_store(5).await;
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let embedder = Embedder::with_limits(provider, 2, 2);

        let report = embed_pending(&store, &embedder, None).await.unwrap();
        assert_eq!(
            report,
            EmbedReport {
                pending: 5,
                embedded: 5,
                failed: 0
            }
        );

        let again = embed_pending(&store, &embedder, None).await.unwrap();
        assert_eq!(again.pending, 0);
    }

    #[tokio::test]
    async fn test_failed_chunk_retried_once() {
        let store = seeded_store(4).await;
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first: 1,
        });
        let embedder = Embedder::with_limits(provider, 2, 1);

        let report = embed_pending(&store, &embedder, None).await.unwrap();
        assert_eq!(report.embedded, 4);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_persistent_failure_leaves_entries_pending() {
        let store = seeded_store(3).await;
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
        });
        let embedder = Embedder::with_limits(provider, 2, 1);

        let report = embed_pending(&store, &embedder, None).await.unwrap();
        assert_eq!(report.embedded, 0);
        assert_eq!(report.failed, 3);
        assert_eq!(store.pending_embeddings("flaky", None).await.unwrap().len(), 3);
    }
}
