//! In-memory [`NomenclatureStore`] implementation for tests and tooling.
//!
//! Uses `BTreeMap`/`HashMap` behind `std::sync::RwLock`. Nearest-neighbour
//! search is brute-force cosine similarity over every current vector.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::NomenclatureStore;
use crate::embedding::cosine_similarity;
use crate::lexical::{fold, matches_probe};
use crate::models::{IndexStats, NomenclatureEntry, PendingEmbedding};

struct StoredEntry {
    entry: NomenclatureEntry,
    folded: String,
    description_hash: String,
}

impl StoredEntry {
    fn new(entry: NomenclatureEntry) -> Self {
        Self {
            folded: fold(&entry.description),
            description_hash: entry.description_hash(),
            entry,
        }
    }
}

struct StoredVector {
    vector: Vec<f32>,
    model: String,
    description_hash: String,
}

/// In-memory store for tests and embedding-free tooling.
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, StoredEntry>>,
    vectors: RwLock<HashMap<String, StoredVector>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            vectors: RwLock::new(HashMap::new()),
        }
    }

    fn entries(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, StoredEntry>>> {
        self.entries
            .read()
            .map_err(|_| anyhow!("entry table lock poisoned"))
    }

    fn entries_mut(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, StoredEntry>>> {
        self.entries
            .write()
            .map_err(|_| anyhow!("entry table lock poisoned"))
    }

    fn vectors(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredVector>>> {
        self.vectors
            .read()
            .map_err(|_| anyhow!("vector table lock poisoned"))
    }

    fn vectors_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredVector>>> {
        self.vectors
            .write()
            .map_err(|_| anyhow!("vector table lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NomenclatureStore for InMemoryStore {
    async fn insert_entries(&self, entries: &[NomenclatureEntry]) -> Result<usize> {
        let mut stored = self.entries_mut()?;
        let mut inserted = 0;
        for entry in entries {
            if stored.contains_key(&entry.code) {
                continue;
            }
            stored.insert(entry.code.clone(), StoredEntry::new(entry.clone()));
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn correct_entry(
        &self,
        code: &str,
        description: &str,
        notes: Option<&str>,
    ) -> Result<bool> {
        let mut stored = self.entries_mut()?;
        let Some(existing) = stored.get_mut(code) else {
            return Ok(false);
        };
        let mut entry = existing.entry.clone();
        entry.description = description.trim().to_string();
        if let Some(n) = notes {
            entry.notes = Some(n.to_string()).filter(|n| !n.trim().is_empty());
        }
        *existing = StoredEntry::new(entry);
        Ok(true)
    }

    async fn get_entry(&self, code: &str) -> Result<Option<NomenclatureEntry>> {
        Ok(self.entries()?.get(code).map(|s| s.entry.clone()))
    }

    async fn upsert_embedding(
        &self,
        code: &str,
        vector: &[f32],
        model: &str,
        description_hash: &str,
    ) -> Result<()> {
        if !self.entries()?.contains_key(code) {
            bail!("no nomenclature entry with code {}", code);
        }
        let mut vectors = self.vectors_mut()?;
        if let Some(other) = vectors.iter().find(|(c, _)| c.as_str() != code) {
            if other.1.vector.len() != vector.len() {
                bail!(
                    "embedding for {} has {} dimensions, index holds {}",
                    code,
                    vector.len(),
                    other.1.vector.len()
                );
            }
        }
        vectors.insert(
            code.to_string(),
            StoredVector {
                vector: vector.to_vec(),
                model: model.to_string(),
                description_hash: description_hash.to_string(),
            },
        );
        Ok(())
    }

    async fn pending_embeddings(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PendingEmbedding>> {
        let entries = self.entries()?;
        let vectors = self.vectors()?;
        Ok(entries
            .values()
            .filter(|s| match vectors.get(&s.entry.code) {
                Some(v) => v.model != model || v.description_hash != s.description_hash,
                None => true,
            })
            .take(limit.unwrap_or(usize::MAX))
            .map(|s| PendingEmbedding {
                code: s.entry.code.clone(),
                description: s.entry.description.clone(),
                description_hash: s.description_hash.clone(),
            })
            .collect())
    }

    async fn clear_embeddings(&self) -> Result<u64> {
        let mut vectors = self.vectors_mut()?;
        let removed = vectors.len() as u64;
        vectors.clear();
        Ok(removed)
    }

    async fn nearest(
        &self,
        query_vec: &[f32],
        model: &str,
        limit: usize,
        threshold: Option<f64>,
    ) -> Result<Vec<(NomenclatureEntry, f64)>> {
        let entries = self.entries()?;
        let vectors = self.vectors()?;
        let mut scored: Vec<(NomenclatureEntry, f64)> = vectors
            .iter()
            .filter_map(|(code, sv)| {
                let stored = entries.get(code)?;
                if sv.model != model || stored.description_hash != sv.description_hash {
                    return None;
                }
                let sim = cosine_similarity(query_vec, &sv.vector) as f64;
                if threshold.is_some_and(|t| sim < t) {
                    return None;
                }
                Some((stored.entry.clone(), sim))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.code.cmp(&b.0.code))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn code_prefix_candidates(
        &self,
        digits: &str,
        limit: usize,
    ) -> Result<Vec<NomenclatureEntry>> {
        Ok(self
            .entries()?
            .values()
            .filter(|s| s.entry.digits().starts_with(digits))
            .take(limit)
            .map(|s| s.entry.clone())
            .collect())
    }

    async fn text_candidates(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<NomenclatureEntry>> {
        let entries = self.entries()?;
        let mut found: BTreeMap<&str, &NomenclatureEntry> = BTreeMap::new();
        for term in terms {
            let term = std::slice::from_ref(term);
            for s in entries
                .values()
                .filter(|s| matches_probe(&s.folded, term))
                .take(limit)
            {
                found.insert(s.entry.code.as_str(), &s.entry);
            }
        }
        Ok(found.into_values().cloned().collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let entries = self.entries()?;
        let vectors = self.vectors()?;
        let mut embedded = 0u64;
        let mut stale = 0u64;
        for (code, sv) in vectors.iter() {
            match entries.get(code) {
                Some(s) if s.description_hash == sv.description_hash => embedded += 1,
                Some(_) => stale += 1,
                None => {}
            }
        }
        let chapters: HashSet<&str> = entries.values().map(|s| s.entry.chapter.as_str()).collect();
        Ok(IndexStats {
            entries: entries.len() as u64,
            embedded,
            stale,
            chapters: chapters.len() as u64,
            dims: vectors.values().next().map(|v| v.vector.len()),
        })
    }
}
