/// Configuration module for repoqna.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::embedder::batch::RetryPolicy;
use crate::indexer::window::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use crate::search::MAX_TOP_K;
use crate::search::planner::{Admissibility, DEFAULT_MIN_SPAN_LINES};

// ── Default value functions ──────────────────────────────────────────

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

fn default_extensions() -> Vec<String> {
    [
        "md", "py", "js", "ts", "go", "java", "cpp", "c", "h", "html", "css", "json", "yaml",
        "yml", "jsx", "tsx", "rs",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ignored_dirs() -> Vec<String> {
    [
        ".git",
        "node_modules",
        "dist",
        "build",
        ".next",
        "__pycache__",
        "venv",
        ".venv",
        ".cache",
        ".vscode",
        "target",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_top_k() -> usize {
    8
}

fn default_min_span_lines() -> usize {
    DEFAULT_MIN_SPAN_LINES
}

fn default_true() -> bool {
    true
}

fn default_rerank_pool() -> usize {
    50
}

fn default_dimensions() -> usize {
    384
}

fn default_batch_size() -> usize {
    32
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_embedding_model_dir() -> String {
    "models/bge-small-en-v1.5".to_string()
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}

fn default_http_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_reranker_model_dir() -> String {
    "models/ms-marco-MiniLM-L-6-v2".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Root for the index database, chunk store and clones.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Keep cloned repositories after ingestion so code lookups can fall
    /// back to the files.
    #[serde(default)]
    pub keep_clones: bool,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub reranker: RerankerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    /// Fallback window size, in lines.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Lines shared by consecutive fallback windows.
    #[serde(default = "default_overlap")]
    pub overlap: usize,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default = "default_ignored_dirs")]
    pub ignored_dirs: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_min_span_lines")]
    pub min_span_lines: usize,

    #[serde(default)]
    pub min_content_chars: usize,

    #[serde(default = "default_true")]
    pub rerank: bool,

    /// Candidates pulled from the index before reranking.
    #[serde(default = "default_rerank_pool")]
    pub rerank_pool: usize,

    /// Prepended to queries before embedding.
    #[serde(default)]
    pub query_prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    Mock,
    Onnx,
    Http,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_model_dir")]
    pub model_dir: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_http_model")]
    pub model: String,

    /// Environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Onnx
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RerankerProvider {
    Lexical,
    CrossEncoder,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_provider")]
    pub provider: RerankerProvider,

    #[serde(default = "default_reranker_model_dir")]
    pub model_dir: String,
}

fn default_reranker_provider() -> RerankerProvider {
    RerankerProvider::Lexical
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            keep_clones: false,
            chunking: ChunkingConfig::default(),
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
            reranker: RerankerConfig::default(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            extensions: default_extensions(),
            ignored_dirs: default_ignored_dirs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_span_lines: default_min_span_lines(),
            min_content_chars: 0,
            rerank: default_true(),
            rerank_pool: default_rerank_pool(),
            query_prefix: String::new(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model_dir: default_embedding_model_dir(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            endpoint: default_endpoint(),
            model: default_http_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker_provider(),
            model_dir: default_reranker_model_dir(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template for the default path.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunking.chunk_size > 0, "chunking.chunk_size must be positive");
        anyhow::ensure!(
            !self.chunking.extensions.is_empty(),
            "at least one file extension must be specified"
        );
        anyhow::ensure!(self.search.top_k > 0, "search.top_k must be positive");
        anyhow::ensure!(
            self.search.rerank_pool >= self.search.top_k,
            "search.rerank_pool must be at least search.top_k"
        );
        anyhow::ensure!(
            self.search.rerank_pool <= MAX_TOP_K,
            "search.rerank_pool must be at most {MAX_TOP_K}"
        );
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            self.embedding.batch_size > 0,
            "embedding.batch_size must be positive"
        );
        Ok(())
    }

    // ── Derived paths ───────────────────────────────────────────────

    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("index.db")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("chunks")
    }

    pub fn repos_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("repos")
    }

    // ── Derived settings ────────────────────────────────────────────

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            batch_size: self.embedding.batch_size,
            max_retries: self.embedding.max_retries,
            base_backoff: Duration::from_millis(self.embedding.base_backoff_ms),
        }
    }

    pub fn admissibility(&self) -> Admissibility {
        Admissibility {
            min_span_lines: self.search.min_span_lines,
            min_content_chars: self.search.min_content_chars,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.search.top_k, 8);
        assert_eq!(config.search.min_span_lines, 10);
        assert_eq!(config.search.rerank_pool, 50);
        assert!(config.search.rerank);
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Onnx);
        assert_eq!(config.reranker.provider, RerankerProvider::Lexical);
        assert!(config.chunking.extensions.contains(&"rs".to_string()));
        assert!(config.chunking.ignored_dirs.contains(&"node_modules".to_string()));
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"data_dir": "/srv/qna", "search": {"top_k": 3}, "embedding": {"provider": "mock"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.data_dir, "/srv/qna");
        assert_eq!(config.search.top_k, 3);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Mock);
        // Other fields should have defaults
        assert_eq!(config.search.rerank_pool, 50);
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.embedding.batch_size, 32);
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_chunk_size() {
        let mut config = Config::default();
        config.chunking.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rerank_pool_below_top_k() {
        let mut config = Config::default();
        config.search.rerank_pool = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_oversized_search_limits() {
        let mut config = Config::default();
        config.search.rerank_pool = MAX_TOP_K + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search.top_k = usize::MAX;
        config.search.rerank_pool = usize::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_extensions() {
        let mut config = Config::default();
        config.chunking.extensions = vec![];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_and_invalid_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let config = Config::load(missing.to_str().unwrap()).unwrap();
        assert_eq!(config.search.top_k, 8);
        assert!(!missing.exists(), "template is only written for config.json");

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ nope").unwrap();
        let config = Config::load(bad.to_str().unwrap()).unwrap();
        assert_eq!(config.chunking.chunk_size, 800);
    }

    #[test]
    fn test_derived_paths_and_settings() {
        let config: Config = serde_json::from_str(
            r#"{"data_dir": "d", "embedding": {"base_backoff_ms": 20, "max_retries": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.db_path(), PathBuf::from("d/index.db"));
        assert_eq!(config.chunks_dir(), PathBuf::from("d/chunks"));
        assert_eq!(config.repos_dir(), PathBuf::from("d/repos"));

        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_backoff, Duration::from_millis(20));
        assert_eq!(config.admissibility().min_span_lines, 10);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let mut config = Config::default();
        config.keep_clones = true;
        config.reranker.provider = RerankerProvider::CrossEncoder;
        config.save(path.to_str().unwrap()).unwrap();

        let parsed = Config::load(path.to_str().unwrap()).unwrap();
        assert!(parsed.keep_clones);
        assert_eq!(parsed.reranker.provider, RerankerProvider::CrossEncoder);
    }
}
