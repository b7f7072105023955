//! Storage abstraction for the nomenclature index.
//!
//! The [`NomenclatureStore`] trait covers everything the search engine and
//! the maintenance commands need from the persisted nomenclature table:
//! nearest-neighbour search over stored embeddings, candidate lookups for
//! lexical matching, and the append/update-only write path (seeding,
//! corrections, embedding upserts).
//!
//! Two backends are provided:
//! - [`SqliteStore`](sqlite::SqliteStore): the persistent index behind the CLI and HTTP server.
//! - [`InMemoryStore`](memory::InMemoryStore): for tests and embedding-free tooling.
//!
//! Implementations must be `Send + Sync` to be shared across concurrent
//! searches.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IndexStats, NomenclatureEntry, PendingEmbedding};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Abstract storage backend for nomenclature entries and their embeddings.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_entries`](NomenclatureStore::insert_entries) | Bulk insert, existing codes untouched |
/// | [`correct_entry`](NomenclatureStore::correct_entry) | Administrative description fix |
/// | [`get_entry`](NomenclatureStore::get_entry) | Lookup by canonical code |
/// | [`upsert_embedding`](NomenclatureStore::upsert_embedding) | Store a vector for an entry |
/// | [`pending_embeddings`](NomenclatureStore::pending_embeddings) | Entries missing a current vector |
/// | [`clear_embeddings`](NomenclatureStore::clear_embeddings) | Drop every stored vector |
/// | [`nearest`](NomenclatureStore::nearest) | Cosine nearest neighbours |
/// | [`code_prefix_candidates`](NomenclatureStore::code_prefix_candidates) | Entries under a code prefix |
/// | [`text_candidates`](NomenclatureStore::text_candidates) | Entries whose description contains a probe term |
/// | [`stats`](NomenclatureStore::stats) | Index counts |
#[async_trait]
pub trait NomenclatureStore: Send + Sync {
    /// Insert entries whose code is not present yet.
    ///
    /// Returns how many rows were inserted. Duplicates are skipped silently.
    async fn insert_entries(&self, entries: &[NomenclatureEntry]) -> Result<usize>;

    /// Replace an entry's description (and notes, when given).
    ///
    /// The stored embedding becomes stale and the entry shows up in
    /// [`pending_embeddings`](NomenclatureStore::pending_embeddings).
    /// Returns `false` when the code does not exist.
    async fn correct_entry(
        &self,
        code: &str,
        description: &str,
        notes: Option<&str>,
    ) -> Result<bool>;

    async fn get_entry(&self, code: &str) -> Result<Option<NomenclatureEntry>>;

    /// Store the embedding computed from the description hashing to `description_hash`.
    ///
    /// Fails if `vector` has a different dimensionality than the vectors
    /// already stored.
    async fn upsert_embedding(
        &self,
        code: &str,
        vector: &[f32],
        model: &str,
        description_hash: &str,
    ) -> Result<()>;

    /// Entries with no vector, a vector from another model, or a vector
    /// computed from an older description. Ordered by code.
    async fn pending_embeddings(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PendingEmbedding>>;

    /// Remove every stored vector, returning how many were removed.
    async fn clear_embeddings(&self) -> Result<u64>;

    /// The `limit` entries most similar to `query_vec`, best first.
    ///
    /// Only vectors produced by `model` from the entry's current description
    /// take part. When `threshold` is set, similarities below it are dropped.
    async fn nearest(
        &self,
        query_vec: &[f32],
        model: &str,
        limit: usize,
        threshold: Option<f64>,
    ) -> Result<Vec<(NomenclatureEntry, f64)>>;

    /// Entries whose code digits start with `digits`, ordered by code.
    async fn code_prefix_candidates(
        &self,
        digits: &str,
        limit: usize,
    ) -> Result<Vec<NomenclatureEntry>>;

    /// Entries whose folded description contains any of `terms`, ordered by code.
    ///
    /// `limit` applies to each term separately, so a term found in thousands
    /// of descriptions cannot crowd out the matches of a rarer one. An entry
    /// matched by several terms is returned once.
    async fn text_candidates(&self, terms: &[String], limit: usize)
        -> Result<Vec<NomenclatureEntry>>;

    async fn stats(&self) -> Result<IndexStats>;
}
