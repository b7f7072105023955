//! Lexical matching of queries against nomenclature entries.
//!
//! Used on every search, alongside semantic retrieval, and on its own when
//! the embedding provider is unavailable. Text is folded (lowercase, accents
//! removed, punctuation collapsed to single spaces) before comparison, so
//! `"Computadores portáteis"` and `"computadores portateis"` match.
//!
//! # Scoring
//!
//! Each candidate gets the best applicable score from [`LexicalWeights`]:
//!
//! | Match | Default |
//! |-------|---------|
//! | code equals query digits | 0.95 |
//! | code starts with query digits | 0.80 |
//! | description equals query | 0.75 |
//! | description starts with query | 0.65 |
//! | description contains query | 0.55 |
//! | token coverage + trigram containment | up to 0.45 |
//!
//! Scores are deterministic for a given query, entry and weight set.

use std::collections::HashMap;

use crate::config::LexicalWeights;
use crate::models::{MatchType, NomenclatureEntry, SearchResult};
use crate::ncm;
use crate::search::sort_results;

/// Words too common to be useful as candidate probes.
const STOPWORDS: &[&str] = &[
    "de", "da", "do", "das", "dos", "em", "para", "com", "por", "the", "of", "and", "for", "with",
];

/// Tokens at least this long are probed by their leading stem only.
const STEM_MIN_LEN: usize = 5;
const STEM_LEN: usize = 4;

/// Lowercase, strip accents, and collapse non-alphanumerics to single spaces.
pub fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        let c = fold_char(c);
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }
    out
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

fn trigrams(folded: &str) -> Vec<[char; 3]> {
    let chars: Vec<char> = folded.chars().collect();
    if chars.len() < 3 {
        return Vec::new();
    }
    let mut out: Vec<[char; 3]> = chars.windows(3).map(|w| [w[0], w[1], w[2]]).collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Fraction of `query` trigrams that also occur in `doc`. Both sorted, deduped.
fn trigram_containment(query: &[[char; 3]], doc: &[[char; 3]]) -> f64 {
    if query.is_empty() || doc.is_empty() {
        return 0.0;
    }
    let mut i = 0usize;
    let mut j = 0usize;
    let mut shared = 0usize;
    while i < query.len() && j < doc.len() {
        match query[i].cmp(&doc[j]) {
            std::cmp::Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    shared as f64 / query.len() as f64
}

/// A query prepared once for lexical scoring against many entries.
#[derive(Debug, Clone)]
pub struct LexicalQuery {
    folded: String,
    tokens: Vec<String>,
    trigrams: Vec<[char; 3]>,
    code_digits: Option<String>,
}

impl LexicalQuery {
    pub fn new(text: &str) -> Self {
        let folded = fold(text);
        let tokens = folded
            .split(' ')
            .filter(|t| t.chars().count() >= 2 && !STOPWORDS.contains(t))
            .map(str::to_string)
            .collect();
        let trigrams = trigrams(&folded);
        Self {
            folded,
            tokens,
            trigrams,
            code_digits: ncm::code_digits(text),
        }
    }

    /// Digits of the query when it reads as an NCM code.
    pub fn code_digits(&self) -> Option<&str> {
        self.code_digits.as_deref()
    }

    pub fn folded(&self) -> &str {
        &self.folded
    }

    /// Terms a store uses to preselect description candidates.
    ///
    /// Long tokens are reduced to a short stem so inflected forms
    /// ("computador" / "computadores") still meet.
    pub fn probe_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = self
            .tokens
            .iter()
            .map(|t| {
                if t.chars().count() >= STEM_MIN_LEN {
                    t.chars().take(STEM_LEN).collect()
                } else {
                    t.clone()
                }
            })
            .collect();
        terms.sort();
        terms.dedup();
        terms
    }
}

/// True when a folded description contains any of the probe terms.
pub fn matches_probe(folded_description: &str, terms: &[String]) -> bool {
    terms.iter().any(|t| folded_description.contains(t.as_str()))
}

/// Scores entries against a [`LexicalQuery`] using configured weights.
#[derive(Debug, Clone)]
pub struct LexicalScorer {
    weights: LexicalWeights,
}

impl LexicalScorer {
    pub fn new(weights: LexicalWeights) -> Self {
        Self { weights }
    }

    /// Best lexical score for `entry`, or `None` when nothing matched.
    pub fn score(&self, query: &LexicalQuery, entry: &NomenclatureEntry) -> Option<f64> {
        let w = &self.weights;
        let mut best = 0.0f64;

        if let Some(q) = query.code_digits() {
            let digits = entry.digits();
            if digits == q {
                best = best.max(w.exact_code);
            } else if digits.starts_with(q) {
                best = best.max(w.code_prefix);
            }
        }

        if !query.folded.is_empty() {
            let description = fold(&entry.description);
            if description == query.folded {
                best = best.max(w.description_exact);
            } else if description.starts_with(&query.folded) {
                best = best.max(w.description_prefix);
            } else if description.contains(&query.folded) {
                best = best.max(w.description_substring);
            }

            let fuzzy = self.fuzzy(query, &description);
            if fuzzy >= w.fuzzy_min {
                best = best.max(fuzzy);
            }
        }

        if best > 0.0 {
            Some(best.clamp(0.0, 1.0))
        } else {
            None
        }
    }

    fn fuzzy(&self, query: &LexicalQuery, description: &str) -> f64 {
        let coverage = if query.tokens.is_empty() {
            0.0
        } else {
            let words: Vec<&str> = description.split(' ').collect();
            let hits = query
                .tokens
                .iter()
                .filter(|t| {
                    words.iter().any(|w| {
                        w.starts_with(t.as_str())
                            || (w.chars().count() >= STEM_LEN && t.starts_with(*w))
                    })
                })
                .count();
            hits as f64 / query.tokens.len() as f64
        };
        let containment = trigram_containment(&query.trigrams, &trigrams(description));
        self.weights.fuzzy_max * (0.6 * coverage + 0.4 * containment)
    }

    /// Score candidates, drop non-matches and duplicates, and keep the best `limit`.
    pub fn rank(
        &self,
        query: &LexicalQuery,
        candidates: Vec<NomenclatureEntry>,
        limit: usize,
    ) -> Vec<SearchResult> {
        let mut by_code: HashMap<String, SearchResult> = HashMap::new();
        for entry in candidates {
            let Some(score) = self.score(query, &entry) else {
                continue;
            };
            match by_code.get(&entry.code) {
                Some(existing) if existing.score >= score => {}
                _ => {
                    by_code.insert(
                        entry.code.clone(),
                        SearchResult {
                            entry,
                            score,
                            match_type: MatchType::Lexical,
                        },
                    );
                }
            }
        }
        let mut results: Vec<SearchResult> = by_code.into_values().collect();
        sort_results(&mut results);
        results.truncate(limit);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, description: &str) -> NomenclatureEntry {
        NomenclatureEntry::new(code, description, None).unwrap()
    }

    fn scorer() -> LexicalScorer {
        LexicalScorer::new(LexicalWeights::default())
    }

    #[test]
    fn test_fold_strips_accents_and_punctuation() {
        assert_eq!(
            fold("Computadores  portáteis, (peso ≤ 10 kg)"),
            "computadores portateis peso 10 kg"
        );
        assert_eq!(fold("AÇÚCAR"), "acucar");
        assert_eq!(fold("8471.30"), "8471 30");
        assert_eq!(fold("  --  "), "");
    }

    #[test]
    fn test_exact_code_beats_prefix() {
        let q = LexicalQuery::new("8471.30.12");
        let exact = scorer().score(&q, &entry("8471.30.12", "Portable computers")).unwrap();
        let q_prefix = LexicalQuery::new("8471.30");
        let prefix = scorer()
            .score(&q_prefix, &entry("8471.30.12", "Portable computers"))
            .unwrap();
        assert!((exact - 0.95).abs() < 1e-9);
        assert!((prefix - 0.80).abs() < 1e-9);
    }

    #[test]
    fn test_description_match_ladder() {
        let s = scorer();
        let q = LexicalQuery::new("portable computers");
        let exact = s.score(&q, &entry("8471.30.12", "Portable computers")).unwrap();
        let prefix = s
            .score(&q, &entry("8471.30.19", "Portable computers, other"))
            .unwrap();
        let substring = s
            .score(&q, &entry("8471.30.90", "Other portable computers"))
            .unwrap();
        assert!(exact > prefix && prefix > substring);
    }

    #[test]
    fn test_fuzzy_match_on_inflection() {
        let q = LexicalQuery::new("computador portatil");
        let score = scorer()
            .score(&q, &entry("8471.30.12", "Computadores portáteis"))
            .unwrap();
        assert!(score > 0.0 && score <= 0.45 + 1e-9);
    }

    #[test]
    fn test_unrelated_text_has_no_score() {
        let q = LexicalQuery::new("laptop");
        assert!(scorer()
            .score(&q, &entry("8471.30.12", "Portable computers"))
            .is_none());
    }

    #[test]
    fn test_probe_terms_use_stems_and_skip_stopwords() {
        let q = LexicalQuery::new("Máquinas de costura tv");
        assert_eq!(q.probe_terms(), vec!["cost", "maqu", "tv"]);
    }

    #[test]
    fn test_rank_dedupes_and_orders() {
        let q = LexicalQuery::new("8471");
        let candidates = vec![
            entry("8471.30.19", "Other portable computers"),
            entry("8471.30.12", "Portable computers"),
            entry("8471.30.12", "Portable computers"),
            entry("8517.13.00", "Smartphones"),
        ];
        let ranked = scorer().rank(&q, candidates, 10);
        let codes: Vec<&str> = ranked.iter().map(|r| r.entry.code.as_str()).collect();
        assert_eq!(codes, vec!["8471.30.12", "8471.30.19"]);
        assert!(ranked.iter().all(|r| r.match_type == MatchType::Lexical));
    }

    #[test]
    fn test_containment_bounds() {
        let a = trigrams("abcd");
        assert!((trigram_containment(&a, &a) - 1.0).abs() < 1e-9);
        assert_eq!(trigram_containment(&[], &a), 0.0);
    }
}
