use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on items per upstream embedding request.
pub const MAX_EMBED_BATCH: usize = 500;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub seed: SeedConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            base_url: default_base_url(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    MAX_EMBED_BATCH
}
fn default_max_concurrency() -> usize {
    4
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Chunk size actually sent upstream, never above [`MAX_EMBED_BATCH`].
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_EMBED_BATCH)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub semantic_for_code_queries: bool,
    /// Cap on rows pulled from the index before lexical scoring.
    #[serde(default = "default_lexical_candidates")]
    pub lexical_candidates: usize,
    #[serde(default)]
    pub lexical: LexicalWeights,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            default_threshold: default_threshold(),
            timeout_ms: default_search_timeout_ms(),
            semantic_for_code_queries: false,
            lexical_candidates: default_lexical_candidates(),
            lexical: LexicalWeights::default(),
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_limit() -> usize {
    10
}
fn default_max_limit() -> usize {
    50
}
fn default_threshold() -> f64 {
    0.5
}
fn default_search_timeout_ms() -> u64 {
    3000
}
fn default_lexical_candidates() -> usize {
    2000
}

/// Scores assigned to each kind of lexical match.
///
/// All weights live in `[0, 1]`. They are kept below typical high-confidence
/// semantic similarities, except for exact and prefix code hits.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LexicalWeights {
    #[serde(default = "w_exact_code")]
    pub exact_code: f64,
    #[serde(default = "w_code_prefix")]
    pub code_prefix: f64,
    #[serde(default = "w_description_exact")]
    pub description_exact: f64,
    #[serde(default = "w_description_prefix")]
    pub description_prefix: f64,
    #[serde(default = "w_description_substring")]
    pub description_substring: f64,
    #[serde(default = "w_fuzzy_max")]
    pub fuzzy_max: f64,
    #[serde(default = "w_fuzzy_min")]
    pub fuzzy_min: f64,
}

impl Default for LexicalWeights {
    fn default() -> Self {
        Self {
            exact_code: w_exact_code(),
            code_prefix: w_code_prefix(),
            description_exact: w_description_exact(),
            description_prefix: w_description_prefix(),
            description_substring: w_description_substring(),
            fuzzy_max: w_fuzzy_max(),
            fuzzy_min: w_fuzzy_min(),
        }
    }
}

fn w_exact_code() -> f64 {
    0.95
}
fn w_code_prefix() -> f64 {
    0.80
}
fn w_description_exact() -> f64 {
    0.75
}
fn w_description_prefix() -> f64 {
    0.65
}
fn w_description_substring() -> f64 {
    0.55
}
fn w_fuzzy_max() -> f64 {
    0.45
}
fn w_fuzzy_min() -> f64 {
    0.05
}

impl LexicalWeights {
    fn validate(&self) -> Result<()> {
        let named = [
            ("exact_code", self.exact_code),
            ("code_prefix", self.code_prefix),
            ("description_exact", self.description_exact),
            ("description_prefix", self.description_prefix),
            ("description_substring", self.description_substring),
            ("fuzzy_max", self.fuzzy_max),
            ("fuzzy_min", self.fuzzy_min),
        ];
        for (name, value) in named {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("search.lexical.{} must be in [0.0, 1.0]", name);
            }
        }
        if self.fuzzy_min > self.fuzzy_max {
            anyhow::bail!("search.lexical.fuzzy_min must be <= search.lexical.fuzzy_max");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedConfig {
    #[serde(default = "default_seed_batch")]
    pub batch_size: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            batch_size: default_seed_batch(),
        }
    }
}

fn default_seed_batch() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// SHA-256 hex digests of the bearer tokens accepted by the HTTP API.
    #[serde(default)]
    pub api_token_sha256: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_ms: default_request_timeout_ms(),
            api_token_sha256: Vec::new(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Config {
    /// Configuration with every section defaulted, pointing at `db_path`.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            seed: SeedConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let search = &self.search;
        if search.default_limit < 1 {
            anyhow::bail!("search.default_limit must be >= 1");
        }
        if search.max_limit < search.default_limit {
            anyhow::bail!("search.max_limit must be >= search.default_limit");
        }
        if !(0.0..=1.0).contains(&search.default_threshold) {
            anyhow::bail!("search.default_threshold must be in [0.0, 1.0]");
        }
        if search.timeout_ms == 0 {
            anyhow::bail!("search.timeout_ms must be > 0");
        }
        if search.lexical_candidates == 0 {
            anyhow::bail!("search.lexical_candidates must be > 0");
        }
        search.lexical.validate()?;

        if self.seed.batch_size == 0 {
            anyhow::bail!("seed.batch_size must be > 0");
        }

        let embedding = &self.embedding;
        if embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        if embedding.max_concurrency == 0 {
            anyhow::bail!("embedding.max_concurrency must be > 0");
        }
        if embedding.is_enabled() {
            if embedding.dims.is_none() || embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
        }

        match embedding.provider.as_str() {
            "disabled" | "openai" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled or openai.",
                other
            ),
        }

        for digest in &self.server.api_token_sha256 {
            if digest.len() != 64 || hex::decode(digest).is_err() {
                anyhow::bail!("server.api_token_sha256 entries must be 64-char hex SHA-256 digests");
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
