//! TOML configuration.
//!
//! Only `[db]` is required; every other section falls back to defaults.
//! API keys never live in the file: providers read `OPENAI_API_KEY` and
//! `COHERE_API_KEY` from the environment. Extra discovery ignore globs may
//! be supplied through `FACTGAP_IGNORE_GLOBS` (comma separated).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use factgap_core::chunk::ChunkerConfig;
use factgap_core::index::IndexSettings;
use factgap_core::rerank::RerankSettings;
use factgap_core::retrieval::RetrievalSettings;

pub const IGNORE_GLOBS_ENV: &str = "FACTGAP_IGNORE_GLOBS";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Owner of everything this installation indexes and queries.
#[derive(Debug, Deserialize, Clone)]
pub struct ScopeConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Repository name used when a command does not pass `--repo`.
    #[serde(default)]
    pub repo: Option<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            repo: None,
        }
    }
}

fn default_user_id() -> String {
    "local".to_string()
}

/// Which files of a checkout enter indexing.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DiscoveryConfig {
    /// Directories (trailing `/`) and single files, relative to the repo root.
    #[serde(default = "default_include_roots")]
    pub include_roots: Vec<String>,
    #[serde(default = "default_ignore_globs")]
    pub ignore_globs: Vec<String>,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Chunk cap for one `index repo` run.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default)]
    pub include_tests: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            include_roots: default_include_roots(),
            ignore_globs: default_ignore_globs(),
            max_files: default_max_files(),
            max_chunks: default_max_chunks(),
            max_file_bytes: default_max_file_bytes(),
            include_tests: false,
        }
    }
}

fn default_include_roots() -> Vec<String> {
    [
        "src/",
        "lib/",
        "app/",
        "apps/",
        "crates/",
        "docs/",
        "adr/",
        ".github/",
        "README.md",
        "CLAUDE.md",
        "AGENTS.md",
        "SECURITY.md",
        "CONTRIBUTING.md",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_ignore_globs() -> Vec<String> {
    [
        "**/node_modules/**",
        "**/.git/**",
        "**/dist/**",
        "**/build/**",
        "**/.next/**",
        "**/out/**",
        "**/coverage/**",
        "**/target/**",
        "**/venv/**",
        "**/.venv/**",
        "**/__pycache__/**",
        "**/.pytest_cache/**",
        "**/.mypy_cache/**",
        "**/.ruff_cache/**",
        "**/.cache/**",
        "**/*.egg-info/**",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_files() -> usize {
    800
}
fn default_max_chunks() -> usize {
    5000
}
fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_code_size")]
    pub code_chunk_size: usize,
    #[serde(default = "default_code_overlap")]
    pub code_overlap: usize,
    #[serde(default = "default_diff_size")]
    pub diff_chunk_size: usize,
    #[serde(default = "default_diff_overlap")]
    pub diff_overlap: usize,
    #[serde(default = "default_doc_size")]
    pub doc_chunk_size: usize,
    #[serde(default = "default_doc_overlap")]
    pub doc_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            code_chunk_size: default_code_size(),
            code_overlap: default_code_overlap(),
            diff_chunk_size: default_diff_size(),
            diff_overlap: default_diff_overlap(),
            doc_chunk_size: default_doc_size(),
            doc_overlap: default_doc_overlap(),
        }
    }
}

fn default_code_size() -> usize {
    ChunkerConfig::CODE.chunk_size
}
fn default_code_overlap() -> usize {
    ChunkerConfig::CODE.chunk_overlap
}
fn default_diff_size() -> usize {
    ChunkerConfig::DIFF.chunk_size
}
fn default_diff_overlap() -> usize {
    ChunkerConfig::DIFF.chunk_overlap
}
fn default_doc_size() -> usize {
    ChunkerConfig::DOCUMENT.chunk_size
}
fn default_doc_overlap() -> usize {
    ChunkerConfig::DOCUMENT.chunk_overlap
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_true")]
    pub enable_enrichment: bool,
    #[serde(default = "default_max_total_chunks")]
    pub max_total_chunks_per_run: usize,
    #[serde(default = "default_max_changed_files")]
    pub max_changed_files_indexed: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            enable_enrichment: true,
            max_total_chunks_per_run: default_max_total_chunks(),
            max_changed_files_indexed: default_max_changed_files(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_total_chunks() -> usize {
    1500
}
fn default_max_changed_files() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enable_intent_routing: bool,
    /// Candidates kept after merging all scopes.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidates requested from each scope.
    #[serde(default = "default_scope_k")]
    pub scope_k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Evidence items passed to answer composition after reranking.
    #[serde(default = "default_final_k")]
    pub final_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enable_intent_routing: true,
            top_k: default_top_k(),
            scope_k: default_scope_k(),
            min_score: default_min_score(),
            final_k: default_final_k(),
        }
    }
}

fn default_top_k() -> usize {
    40
}
fn default_scope_k() -> usize {
    30
}
fn default_min_score() -> f64 {
    0.5
}
fn default_final_k() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    #[serde(default = "default_true")]
    pub enable_rerank: bool,
    #[serde(default = "default_true")]
    pub enable_diversity: bool,
    /// `cohere` or `disabled`.
    #[serde(default = "default_rerank_provider")]
    pub provider: String,
    #[serde(default = "default_rerank_model")]
    pub model: String,
    /// Use the generation model as a reranker when the provider is
    /// unavailable.
    #[serde(default = "default_true")]
    pub llm_fallback: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enable_rerank: true,
            enable_diversity: true,
            provider: default_rerank_provider(),
            model: default_rerank_model(),
            llm_fallback: true,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_rerank_provider() -> String {
    "disabled".to_string()
}
fn default_rerank_model() -> String {
    "rerank-english-v3.0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai` or `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama host, or an OpenAI-compatible endpoint).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    factgap_core::embedding::DEFAULT_BATCH_SIZE
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Chat model used for answers, PR analysis and LLM reranking.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `disabled` or `openai`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_generation_model(),
            url: None,
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_generation_timeout() -> u64 {
    60
}

impl Config {
    /// Defaults for everything, with the database at `db_path`.
    pub fn with_db(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            scope: ScopeConfig::default(),
            discovery: DiscoveryConfig::default(),
            chunking: ChunkingConfig::default(),
            indexing: IndexingConfig::default(),
            retrieval: RetrievalConfig::default(),
            rerank: RerankConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
        }
    }

    pub fn index_settings(&self) -> IndexSettings {
        let c = &self.chunking;
        IndexSettings {
            enrichment: self.indexing.enable_enrichment,
            code: ChunkerConfig {
                chunk_size: c.code_chunk_size,
                chunk_overlap: c.code_overlap,
            },
            diff: ChunkerConfig {
                chunk_size: c.diff_chunk_size,
                chunk_overlap: c.diff_overlap,
            },
            document: ChunkerConfig {
                chunk_size: c.doc_chunk_size,
                chunk_overlap: c.doc_overlap,
            },
            max_total_chunks_per_run: self.indexing.max_total_chunks_per_run,
            max_changed_files_indexed: self.indexing.max_changed_files_indexed,
            batch_size: self.embedding.batch_size,
        }
    }

    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            intent_routing: self.retrieval.enable_intent_routing,
            top_k: self.retrieval.top_k,
            scope_k: self.retrieval.scope_k,
            min_score: self.retrieval.min_score,
        }
    }

    pub fn rerank_settings(&self) -> RerankSettings {
        RerankSettings {
            enabled: self.rerank.enable_rerank,
            diversity: self.rerank.enable_diversity,
        }
    }
}

/// Split a `FACTGAP_IGNORE_GLOBS` value into globs.
pub fn parse_ignore_globs(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(String::from)
        .collect()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if let Ok(extra) = std::env::var(IGNORE_GLOBS_ENV) {
        config.discovery.ignore_globs.extend(parse_ignore_globs(&extra));
    }

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let c = &config.chunking;
    for (name, size, overlap) in [
        ("code", c.code_chunk_size, c.code_overlap),
        ("diff", c.diff_chunk_size, c.diff_overlap),
        ("doc", c.doc_chunk_size, c.doc_overlap),
    ] {
        if size == 0 {
            anyhow::bail!("chunking.{name}_chunk_size must be > 0");
        }
        if overlap >= size {
            anyhow::bail!("chunking.{name}_overlap must be smaller than chunking.{name}_chunk_size");
        }
    }

    if config.retrieval.top_k < 1 || config.retrieval.scope_k < 1 || config.retrieval.final_k < 1 {
        anyhow::bail!("retrieval.top_k, retrieval.scope_k and retrieval.final_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [-1.0, 1.0]");
    }

    if config.discovery.max_files == 0 {
        anyhow::bail!("discovery.max_files must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    if config.scope.user_id.trim().is_empty() {
        anyhow::bail!("scope.user_id must not be empty");
    }

    match config.embedding.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when set");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    match config.rerank.provider.as_str() {
        "disabled" | "cohere" => {}
        other => anyhow::bail!(
            "Unknown rerank provider: '{}'. Must be disabled or cohere.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse("[db]\npath = \"./data/factgap.sqlite\"\n").unwrap();
        assert_eq!(cfg.scope.user_id, "local");
        assert_eq!(cfg.discovery.max_files, 800);
        assert_eq!(cfg.retrieval.scope_k, 30);
        assert_eq!(cfg.retrieval.min_score, 0.5);
        assert!(cfg.rerank.enable_diversity);
        assert!(!cfg.embedding.is_enabled());

        let settings = cfg.index_settings();
        assert_eq!(settings.code, ChunkerConfig::CODE);
        assert_eq!(settings.max_total_chunks_per_run, 1500);
    }

    #[test]
    fn test_feature_flags() {
        let cfg = parse(
            r#"
            [db]
            path = "x.sqlite"

            [retrieval]
            enable_intent_routing = false

            [rerank]
            enable_rerank = false
            enable_diversity = false

            [indexing]
            enable_enrichment = false
            "#,
        )
        .unwrap();
        assert!(!cfg.retrieval_settings().intent_routing);
        assert!(!cfg.rerank_settings().enabled);
        assert!(!cfg.rerank_settings().diversity);
        assert!(!cfg.index_settings().enrichment);
    }

    #[test]
    fn test_rejects_overlap_not_below_size() {
        let err = parse("[db]\npath = \"x\"\n[chunking]\ndiff_chunk_size = 100\ndiff_overlap = 100\n")
            .unwrap_err();
        assert!(err.to_string().contains("diff_overlap"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_openai_requires_model() {
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").is_err());
    }

    #[test]
    fn test_parse_ignore_globs() {
        assert_eq!(
            parse_ignore_globs(" vendor/**, ,*.lock "),
            vec!["vendor/**".to_string(), "*.lock".to_string()]
        );
    }
}
