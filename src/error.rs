//! Typed failures for the search path.
//!
//! Application commands (init, seed, embed, serve) report errors through
//! `anyhow`. The types here exist where a caller has to branch on the kind
//! of failure: the search engine degrades on [`EmbeddingError`] and
//! [`SearchError::IndexQuery`], and the HTTP layer maps
//! [`SearchError::InvalidQuery`] to a 400.

use thiserror::Error;

use crate::embedding::ChunkedBatch;

/// Failure of an upstream embedding call.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("embedding request failed with HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("embedding request failed: {0}")]
    Network(String),
    #[error("embedding request timed out")]
    Timeout,
    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

/// Errors surfaced by [`SearchEngine`](crate::search::SearchEngine).
#[derive(Debug, Error)]
pub enum SearchError {
    /// Empty query text, zero limit, or a non-finite threshold.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error(transparent)]
    EmbeddingProvider(#[from] EmbeddingError),
    #[error("similarity index query failed: {0}")]
    IndexQuery(String),
    #[error("authentication required")]
    Authentication,
    #[error("search cancelled")]
    Cancelled,
}

impl SearchError {
    /// Whether the failure is the caller's fault rather than a dependency's.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SearchError::InvalidQuery(_) | SearchError::Authentication)
    }
}

/// One or more chunks of an `embed_batch` call failed.
///
/// The arena is handed back intact: completed chunks keep their vectors so a
/// retry only needs to re-run the indexes listed in `failed_chunks`.
#[derive(Debug, Error)]
#[error("embedding batch failed for chunk(s) {failed_chunks:?} of {total_chunks}: {first_reason}")]
pub struct BatchEmbedError {
    pub failed_chunks: Vec<usize>,
    pub total_chunks: usize,
    pub first_reason: EmbeddingError,
    pub batch: ChunkedBatch,
}
