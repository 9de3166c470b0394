//! Wiring: build the indexer and query engine from a [`Config`].

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex as TokioMutex;
use tracing::info;

use crate::config::{Config, EmbeddingProvider, RerankerProvider};
use crate::db::Db;
use crate::embedder::Embedder;
use crate::embedder::download::{self, BGE_SMALL_EN, MS_MARCO_MINILM};
use crate::embedder::http::HttpEmbedder;
use crate::embedder::mock::MockEmbedder;
use crate::embedder::onnx::{BGE_SMALL_DIMENSIONS, OnnxEmbedder};
use crate::indexer::core::{IngestOptions, Indexer};
use crate::indexer::extractor::TreeSitterSupport;
use crate::indexer::resolver::ChunkResolver;
use crate::search::cross_encoder::CrossEncoderScorer;
use crate::search::planner::VectorQueryPlanner;
use crate::search::rerank::{LexicalScorer, RelevanceScorer, Reranker};
use crate::search::{QueryEngine, QuerySettings};
use crate::store::ChunkStore;

/// Shared state behind every entry point (CLI commands and MCP tools).
pub struct App {
    pub config: Arc<Config>,
    pub indexer: Indexer,
    pub engine: QueryEngine,
}

impl App {
    /// Build everything `config` asks for, downloading models if needed.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("failed to create data dir: {}", config.data_dir))?;
        let embedder = build_embedder(&config)?;
        let db = Db::open(config.db_path(), embedder.dimensions())
            .context("failed to open vector index")?;
        let reranker = build_reranker(&config)?;
        Ok(Self::assemble(config, db, embedder, reranker))
    }

    /// Build with a given embedder and an in-memory index.
    pub fn in_memory(config: Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let db = Db::open_in_memory(embedder.dimensions())?;
        let reranker = if config.search.rerank {
            Some(Reranker::new(Arc::new(LexicalScorer::default())))
        } else {
            None
        };
        Ok(Self::assemble(config, db, embedder, reranker))
    }

    fn assemble(
        config: Config,
        db: Db,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Reranker>,
    ) -> Self {
        let db = Arc::new(TokioMutex::new(db));
        let store = Arc::new(ChunkStore::new(config.chunks_dir()));
        let resolver = Arc::new(ChunkResolver::new(
            Arc::new(TreeSitterSupport::new()),
            config.chunking.chunk_size,
            config.chunking.overlap,
        ));

        let indexer = Indexer::new(
            Arc::clone(&db),
            Arc::clone(&store),
            Arc::clone(&embedder),
            resolver,
            IngestOptions::from_config(&config),
        );
        let engine = QueryEngine::new(
            db,
            store,
            embedder,
            VectorQueryPlanner::new(config.admissibility()),
            reranker,
            QuerySettings::from_config(&config),
        );

        Self {
            config: Arc::new(config),
            indexer,
            engine,
        }
    }
}

/// Create the configured embedding provider.
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let cfg = &config.embedding;
    let embedder: Arc<dyn Embedder> = match cfg.provider {
        EmbeddingProvider::Mock => {
            info!("Using mock embedder ({} dimensions)", cfg.dimensions);
            Arc::new(MockEmbedder::new(cfg.dimensions))
        }
        EmbeddingProvider::Onnx => {
            anyhow::ensure!(
                cfg.dimensions == BGE_SMALL_DIMENSIONS,
                "embedding.dimensions must be {BGE_SMALL_DIMENSIONS} for the ONNX model"
            );
            let dir = Path::new(&cfg.model_dir);
            download::ensure_model_files(&BGE_SMALL_EN, dir)?;
            Arc::new(OnnxEmbedder::new(dir).context("failed to load embedding model")?)
        }
        EmbeddingProvider::Http => {
            let api_key = std::env::var(&cfg.api_key_env).ok();
            if api_key.is_none() {
                info!("{} not set, calling {} without credentials", cfg.api_key_env, cfg.endpoint);
            }
            Arc::new(
                HttpEmbedder::new(&cfg.endpoint, &cfg.model, cfg.dimensions).with_api_key(api_key),
            )
        }
    };
    Ok(embedder)
}

/// Create the reranker, or `None` when reranking is disabled.
pub fn build_reranker(config: &Config) -> Result<Option<Reranker>> {
    if !config.search.rerank {
        return Ok(None);
    }
    let scorer: Arc<dyn RelevanceScorer> = match config.reranker.provider {
        RerankerProvider::Lexical => Arc::new(LexicalScorer::default()),
        RerankerProvider::CrossEncoder => {
            let dir = Path::new(&config.reranker.model_dir);
            download::ensure_model_files(&MS_MARCO_MINILM, dir)?;
            Arc::new(CrossEncoderScorer::new(dir).context("failed to load reranker model")?)
        }
    };
    Ok(Some(Reranker::new(scorer)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_mock_embedder() {
        let mut config = Config::default();
        config.embedding.provider = EmbeddingProvider::Mock;
        config.embedding.dimensions = 48;
        assert_eq!(build_embedder(&config).unwrap().dimensions(), 48);
    }

    #[test]
    fn test_onnx_requires_model_width() {
        let mut config = Config::default();
        config.embedding.dimensions = 768;
        assert!(build_embedder(&config).is_err());
    }

    #[test]
    fn test_build_reranker() {
        let mut config = Config::default();
        assert!(build_reranker(&config).unwrap().is_some());
        config.search.rerank = false;
        assert!(build_reranker(&config).unwrap().is_none());
    }

    #[test]
    fn test_open_with_mock_provider() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_string_lossy().into_owned();
        config.embedding.provider = EmbeddingProvider::Mock;

        let app = App::open(config).unwrap();
        assert!(dir.path().join("index.db").exists());
        assert_eq!(app.config.search.top_k, 8);
    }
}
