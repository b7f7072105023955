//! NCM search engine: semantic retrieval merged with lexical matching.
//!
//! A search runs two stages side by side:
//!
//! - **Semantic**: the query is embedded and the index returns the nearest
//!   entries by cosine similarity. Similarities below the threshold are
//!   dropped. Skipped for pure code queries unless
//!   `search.semantic_for_code_queries` is set.
//! - **Lexical**: candidates are pulled from the store by code prefix and by
//!   description probe terms, then scored by [`LexicalScorer`].
//!
//! Results are merged by code (higher score wins, entries found by both
//! stages are tagged `semantic`), sorted by score descending with ties
//! broken by code, and truncated to the limit.
//!
//! Provider failures, index failures and timeouts never reach the caller:
//! the engine logs a warning and answers from the lexical stage alone.

use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::config::{Config, LexicalWeights, SearchConfig};
use crate::db;
use crate::embedding::{create_provider, Embedder};
use crate::error::{EmbeddingError, SearchError};
use crate::lexical::{LexicalQuery, LexicalScorer};
use crate::models::{MatchType, SearchQuery, SearchResult};
use crate::ncm;
use crate::store::{NomenclatureStore, SqliteStore};

/// Resolved search parameters.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub default_limit: usize,
    pub max_limit: usize,
    pub default_threshold: f64,
    pub timeout: Duration,
    pub semantic_for_code_queries: bool,
    pub lexical_candidates: usize,
    pub weights: LexicalWeights,
}

impl From<&SearchConfig> for SearchSettings {
    fn from(config: &SearchConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
            default_threshold: config.default_threshold,
            timeout: config.timeout(),
            semantic_for_code_queries: config.semantic_for_code_queries,
            lexical_candidates: config.lexical_candidates,
            weights: config.lexical.clone(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

/// What happened to the semantic stage of one search.
#[derive(Debug)]
enum SemanticOutcome {
    Ran(Vec<SearchResult>),
    Skipped,
    Degraded(SearchError),
}

/// Stateless search orchestrator over a store and an embedder.
///
/// Cheap to share behind an `Arc`; every call to [`search`](Self::search)
/// is independent.
pub struct SearchEngine {
    store: Arc<dyn NomenclatureStore>,
    embedder: Embedder,
    scorer: LexicalScorer,
    settings: SearchSettings,
}

impl SearchEngine {
    pub fn new(
        store: Arc<dyn NomenclatureStore>,
        embedder: Embedder,
        settings: SearchSettings,
    ) -> Self {
        Self {
            scorer: LexicalScorer::new(settings.weights.clone()),
            store,
            embedder,
            settings,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn NomenclatureStore> {
        &self.store
    }

    /// Rank nomenclature entries for a free-text query.
    ///
    /// # Errors
    ///
    /// Only [`SearchError::InvalidQuery`]: blank text, a zero limit or a
    /// non-finite threshold. Everything else degrades to lexical results.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        let (text, limit, threshold) = self.normalize(query)?;
        let started = Instant::now();
        let lexical_query = LexicalQuery::new(text);

        let skip_semantic =
            !self.settings.semantic_for_code_queries && ncm::looks_like_code(text);

        let (semantic, lexical) = tokio::join!(
            self.semantic(text, limit, threshold, skip_semantic),
            self.lexical(&lexical_query, limit),
        );

        let semantic = match semantic {
            SemanticOutcome::Ran(results) => results,
            SemanticOutcome::Skipped => {
                tracing::debug!("semantic stage skipped for code query");
                Vec::new()
            }
            SemanticOutcome::Degraded(err) => {
                tracing::warn!(
                    error = %err,
                    "semantic search unavailable, using lexical matches only"
                );
                Vec::new()
            }
        };

        let semantic_hits = semantic.len();
        let lexical_hits = lexical.len();
        let results = merge_results(semantic, lexical, limit);

        tracing::debug!(
            semantic_hits,
            lexical_hits,
            returned = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );

        Ok(results)
    }

    /// Like [`search`](Self::search), but gives up as soon as `cancel` resolves.
    ///
    /// In-flight embedding and index calls are dropped and
    /// [`SearchError::Cancelled`] is returned.
    pub async fn search_with_cancel<F>(
        &self,
        query: &SearchQuery,
        cancel: F,
    ) -> Result<Vec<SearchResult>, SearchError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => Err(SearchError::Cancelled),
            result = self.search(query) => result,
        }
    }

    fn normalize<'q>(&self, query: &'q SearchQuery) -> Result<(&'q str, usize, f64), SearchError> {
        let text = query.text.trim();
        if text.is_empty() {
            return Err(SearchError::InvalidQuery("query text is empty".to_string()));
        }

        let limit = match query.limit {
            Some(0) => {
                return Err(SearchError::InvalidQuery(
                    "limit must be at least 1".to_string(),
                ))
            }
            Some(n) => n.min(self.settings.max_limit),
            None => self.settings.default_limit.min(self.settings.max_limit),
        };

        let threshold = query.threshold.unwrap_or(self.settings.default_threshold);
        if !threshold.is_finite() {
            return Err(SearchError::InvalidQuery(
                "threshold must be a finite number".to_string(),
            ));
        }

        Ok((text, limit, threshold.clamp(0.0, 1.0)))
    }

    async fn semantic(
        &self,
        text: &str,
        limit: usize,
        threshold: f64,
        skip: bool,
    ) -> SemanticOutcome {
        if skip {
            return SemanticOutcome::Skipped;
        }

        let vector = match timeout(self.settings.timeout, self.embedder.embed(text)).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return SemanticOutcome::Degraded(e.into()),
            Err(_) => return SemanticOutcome::Degraded(EmbeddingError::Timeout.into()),
        };

        let model = self.embedder.provider().model_name();
        let hits = match timeout(
            self.settings.timeout,
            self.store.nearest(&vector, model, limit, Some(threshold)),
        )
        .await
        {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => return SemanticOutcome::Degraded(SearchError::IndexQuery(e.to_string())),
            Err(_) => {
                return SemanticOutcome::Degraded(SearchError::IndexQuery(
                    "similarity query timed out".to_string(),
                ))
            }
        };

        SemanticOutcome::Ran(
            hits.into_iter()
                .filter_map(|(entry, similarity)| {
                    let score = similarity.clamp(0.0, 1.0);
                    (score >= threshold).then_some(SearchResult {
                        entry,
                        score,
                        match_type: MatchType::Semantic,
                    })
                })
                .collect(),
        )
    }

    async fn lexical(&self, query: &LexicalQuery, limit: usize) -> Vec<SearchResult> {
        let cap = self.settings.lexical_candidates;
        let mut candidates = Vec::new();

        if let Some(digits) = query.code_digits() {
            match self.store.code_prefix_candidates(digits, cap).await {
                Ok(found) => candidates.extend(found),
                Err(e) => tracing::warn!(error = %e, "code prefix lookup failed"),
            }
        }

        let terms = query.probe_terms();
        if !terms.is_empty() {
            match self.store.text_candidates(&terms, cap).await {
                Ok(found) => candidates.extend(found),
                Err(e) => tracing::warn!(error = %e, "description lookup failed"),
            }
        }

        self.scorer.rank(query, candidates, limit)
    }
}

/// Sort by score descending, then code ascending.
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entry.code.cmp(&b.entry.code))
    });
}

/// Merge the two stages by code and keep the best `limit`.
///
/// A code found by both stages keeps the higher score and is tagged
/// [`MatchType::Semantic`].
pub fn merge_results(
    semantic: Vec<SearchResult>,
    lexical: Vec<SearchResult>,
    limit: usize,
) -> Vec<SearchResult> {
    let mut by_code: HashMap<String, SearchResult> = HashMap::new();

    for result in semantic {
        match by_code.get_mut(&result.entry.code) {
            Some(existing) if existing.score >= result.score => {}
            Some(existing) => *existing = result,
            None => {
                by_code.insert(result.entry.code.clone(), result);
            }
        }
    }

    for result in lexical {
        match by_code.get_mut(&result.entry.code) {
            Some(existing) => {
                existing.score = existing.score.max(result.score);
                existing.match_type = MatchType::Semantic;
            }
            None => {
                by_code.insert(result.entry.code.clone(), result);
            }
        }
    }

    let mut merged: Vec<SearchResult> = by_code.into_values().collect();
    sort_results(&mut merged);
    merged.truncate(limit);
    merged
}

/// Build an engine over the configured SQLite index and embedding provider.
pub async fn build_engine(config: &Config) -> Result<SearchEngine> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn NomenclatureStore> = Arc::new(SqliteStore::new(pool));
    let provider = create_provider(&config.embedding)?;
    let embedder = Embedder::new(provider, &config.embedding);
    Ok(SearchEngine::new(
        store,
        embedder,
        SearchSettings::from(&config.search),
    ))
}

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    threshold: Option<f64>,
    json: bool,
) -> Result<()> {
    let engine = build_engine(config).await?;

    let mut search_query = SearchQuery::new(query);
    search_query.limit = limit;
    search_query.threshold = threshold;

    let results = engine.search(&search_query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {}  ({})",
            i + 1,
            r.score,
            r.entry.code,
            r.match_type.as_str()
        );
        println!("    {}", r.entry.description);
        if let Some(section) = &r.entry.section {
            println!("    section: {}  chapter: {}", section, r.entry.chapter);
        }
        println!();
    }

    Ok(())
}
