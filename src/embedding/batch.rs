//! Chunked, bounded-concurrency embedding on top of an [`EmbeddingProvider`].
//!
//! [`Embedder::embed_chunks`] splits the input into chunks of at most
//! `chunk_size` texts (never more than [`MAX_EMBED_BATCH`]) and records one
//! [`ChunkSlot`] per chunk in a [`ChunkedBatch`]. Slot `i` always covers the
//! same input range, whatever order the upstream calls complete in, so the
//! vectors can be flattened back into input order and failed chunks can be
//! retried on their own.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::{check_vectors, EmbeddingProvider};
use crate::config::{EmbeddingConfig, MAX_EMBED_BATCH};
use crate::error::{BatchEmbedError, EmbeddingError};

/// Result of one chunk's upstream call.
#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    Done(Vec<Vec<f32>>),
    Failed(EmbeddingError),
}

/// A contiguous range of the input and what happened to it.
#[derive(Debug, Clone)]
pub struct ChunkSlot {
    pub range: Range<usize>,
    pub outcome: ChunkOutcome,
}

/// Arena of chunk results for one batch, indexed by chunk position.
#[derive(Debug, Clone)]
pub struct ChunkedBatch {
    texts: Vec<String>,
    slots: Vec<ChunkSlot>,
}

impl ChunkedBatch {
    fn new(texts: Vec<String>, chunk_size: usize) -> Self {
        let mut slots = Vec::new();
        let mut start = 0;
        while start < texts.len() {
            let end = (start + chunk_size).min(texts.len());
            slots.push(ChunkSlot {
                range: start..end,
                outcome: ChunkOutcome::Failed(EmbeddingError::Network(
                    "chunk not executed".to_string(),
                )),
            });
            start = end;
        }
        Self { texts, slots }
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn slots(&self) -> &[ChunkSlot] {
        &self.slots
    }

    /// Indexes of chunks whose upstream call failed.
    pub fn failed_chunks(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s.outcome, ChunkOutcome::Failed(_)))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_chunks().is_empty()
    }

    /// Completed chunks as `(input range, vectors)` pairs.
    pub fn completed(&self) -> impl Iterator<Item = (Range<usize>, &[Vec<f32>])> {
        self.slots.iter().filter_map(|s| match &s.outcome {
            ChunkOutcome::Done(vectors) => Some((s.range.clone(), vectors.as_slice())),
            ChunkOutcome::Failed(_) => None,
        })
    }

    /// Flatten into one vector per input text, in input order.
    ///
    /// Fails with the whole arena attached if any chunk failed.
    pub fn into_vectors(self) -> Result<Vec<Vec<f32>>, BatchEmbedError> {
        let first_failure = self.slots.iter().find_map(|s| match &s.outcome {
            ChunkOutcome::Failed(e) => Some(e.clone()),
            ChunkOutcome::Done(_) => None,
        });
        if let Some(first_reason) = first_failure {
            return Err(BatchEmbedError {
                total_chunks: self.slots.len(),
                failed_chunks: self.failed_chunks(),
                first_reason,
                batch: self,
            });
        }

        let mut out = Vec::with_capacity(self.texts.len());
        for slot in self.slots {
            if let ChunkOutcome::Done(vectors) = slot.outcome {
                out.extend(vectors);
            }
        }
        Ok(out)
    }

    /// Re-run only the failed chunks.
    pub async fn retry_failed(&mut self, embedder: &Embedder) {
        let failed = self.failed_chunks();
        if !failed.is_empty() {
            embedder.run_chunks(self, failed).await;
        }
    }
}

/// The embedding generator used by search and re-indexing.
///
/// Cheap to clone; all clones share the same provider.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    chunk_size: usize,
    max_concurrency: usize,
    timeout: Option<Duration>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::with_limits(
            provider,
            config.effective_batch_size(),
            config.max_concurrency,
        )
        .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    pub fn with_limits(
        provider: Arc<dyn EmbeddingProvider>,
        chunk_size: usize,
        max_concurrency: usize,
    ) -> Self {
        Self {
            provider,
            chunk_size: chunk_size.clamp(1, MAX_EMBED_BATCH),
            max_concurrency: max_concurrency.max(1),
            timeout: None,
        }
    }

    /// Bound every upstream call, retries included, by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vectors = call_provider(
            self.provider.as_ref(),
            &[text.to_string()],
            self.timeout,
        )
        .await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Malformed("empty embedding response".to_string()))
    }

    /// Embed `texts`, returning one vector per text in input order.
    ///
    /// Any failed chunk fails the call; the error carries the arena so the
    /// caller can retry just the failed chunks.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BatchEmbedError> {
        self.embed_chunks(texts).await.into_vectors()
    }

    /// Embed `texts` chunk by chunk, keeping every chunk's outcome.
    pub async fn embed_chunks(&self, texts: &[String]) -> ChunkedBatch {
        let mut batch = ChunkedBatch::new(texts.to_vec(), self.chunk_size);
        let all: Vec<usize> = (0..batch.slots.len()).collect();
        self.run_chunks(&mut batch, all).await;
        batch
    }

    async fn run_chunks(&self, batch: &mut ChunkedBatch, indexes: Vec<usize>) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for idx in indexes {
            let texts = batch.texts[batch.slots[idx].range.clone()].to_vec();
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.timeout;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = match call_provider(provider.as_ref(), &texts, timeout).await {
                    Ok(vectors) => ChunkOutcome::Done(vectors),
                    Err(e) => ChunkOutcome::Failed(e),
                };
                (idx, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => {
                    if let ChunkOutcome::Failed(e) = &outcome {
                        tracing::warn!(chunk = idx, error = %e, "embedding chunk failed");
                    }
                    batch.slots[idx].outcome = outcome;
                }
                // The slot keeps its pre-filled failure.
                Err(e) => tracing::error!(error = %e, "embedding chunk task aborted"),
            }
        }
    }
}

async fn call_provider(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    timeout: Option<Duration>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let call = provider.embed_texts(texts);
    let vectors = match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| EmbeddingError::Timeout)??,
        None => call.await?,
    };
    check_vectors(texts.len(), provider.dims(), vectors)
}
