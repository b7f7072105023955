//! Core data models used throughout NCM search.
//!
//! These types represent the nomenclature entries held by the store and the
//! queries and results that flow through the search engine.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ncm;

/// A tariff nomenclature entry as stored in the index.
///
/// The embedding vector is kept by the store next to the entry, keyed by
/// `code`, so that results can be cloned and serialized cheaply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NomenclatureEntry {
    /// Canonical dotted code, e.g. `8471.30.12`.
    pub code: String,
    pub description: String,
    /// Harmonized System section (Roman numeral), derived from the chapter.
    pub section: Option<String>,
    /// Two-digit chapter, derived from the code.
    pub chapter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NomenclatureEntry {
    /// Build an entry from a raw code, deriving chapter and section.
    ///
    /// Returns `None` when the code is not a valid NCM code.
    pub fn new(code: &str, description: &str, notes: Option<String>) -> Option<Self> {
        let code = ncm::canonical_code(code)?;
        let chapter = ncm::chapter_of(&code)?;
        let section = ncm::section_of(&chapter).map(str::to_string);
        Some(Self {
            code,
            description: description.trim().to_string(),
            section,
            chapter,
            notes: notes.filter(|n| !n.trim().is_empty()),
        })
    }

    /// Code digits without dots.
    pub fn digits(&self) -> String {
        self.code.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    /// Hash of the description an embedding must be computed from.
    pub fn description_hash(&self) -> String {
        hash_text(&self.description)
    }
}

/// A record of the external nomenclature dataset used for seeding.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedRecord {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Caller input for a search.
///
/// `limit` and `threshold` fall back to the configured defaults when unset.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub limit: Option<usize>,
    pub threshold: Option<f64>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: None,
            threshold: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// How a result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Semantic,
    Lexical,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Semantic => "semantic",
            MatchType::Lexical => "lexical",
        }
    }
}

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub entry: NomenclatureEntry,
    /// Confidence in `[0.0, 1.0]`.
    pub score: f64,
    #[serde(rename = "matchType")]
    pub match_type: MatchType,
}

/// An entry whose embedding is missing or computed from an older description.
#[derive(Debug, Clone)]
pub struct PendingEmbedding {
    pub code: String,
    pub description: String,
    pub description_hash: String,
}

/// Counts reported by `ncm stats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexStats {
    pub entries: u64,
    pub embedded: u64,
    pub stale: u64,
    pub chapters: u64,
    pub dims: Option<usize>,
}

/// SHA-256 hex digest of a string.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
