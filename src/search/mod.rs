//! The query operation: embed, page through the index, rerank, fetch code.
pub mod cross_encoder;
pub mod planner;
pub mod rerank;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::Db;
use crate::db::models::{RepositoryInfo, SearchCandidate};
use crate::db::search::RepositoryIndex;
use crate::embedder::Embedder;
use crate::error::{Error, Result};
use crate::indexer::languages::detect_display_language;
use crate::store::ChunkStore;
use planner::VectorQueryPlanner;
use rerank::Reranker;

/// Upper bound on results per query, and on the candidate pool handed to
/// the reranker.
pub const MAX_TOP_K: usize = 1000;

/// One search result as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub similarity_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    pub code: String,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub top_k: usize,
    /// Candidates handed to the reranker.
    pub rerank_pool: usize,
    pub query_prefix: String,
}

impl QuerySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.search.top_k,
            rerank_pool: config.search.rerank_pool,
            query_prefix: config.search.query_prefix.clone(),
        }
    }
}

pub struct QueryEngine {
    db: Arc<TokioMutex<Db>>,
    store: Arc<ChunkStore>,
    embedder: Arc<dyn Embedder>,
    planner: Arc<VectorQueryPlanner>,
    reranker: Option<Arc<Reranker>>,
    settings: QuerySettings,
}

impl QueryEngine {
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        store: Arc<ChunkStore>,
        embedder: Arc<dyn Embedder>,
        planner: VectorQueryPlanner,
        reranker: Option<Reranker>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            db,
            store,
            embedder,
            planner: Arc::new(planner),
            reranker: reranker.map(Arc::new),
            settings,
        }
    }

    /// Repositories that currently have a built index.
    pub async fn list(&self) -> Result<Vec<RepositoryInfo>> {
        self.db.lock().await.list_repositories()
    }

    /// Search `repo` for `text`, returning at most `top_k` hits (the
    /// configured default when `None`).
    pub async fn query(
        &self,
        repo: &str,
        text: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<QueryHit>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidQuery("query text is empty".into()));
        }
        let top_k = top_k.unwrap_or(self.settings.top_k);
        if top_k == 0 {
            return Err(Error::InvalidQuery("top_k must be positive".into()));
        }
        if top_k > MAX_TOP_K {
            return Err(Error::InvalidQuery(format!(
                "top_k must be at most {MAX_TOP_K}, got {top_k}"
            )));
        }

        let info = self
            .db
            .lock()
            .await
            .repository(repo)?
            .ok_or_else(|| Error::NotIndexed(repo.to_string()))?;

        let pool = match self.reranker {
            Some(_) => self.settings.rerank_pool.clamp(top_k, MAX_TOP_K),
            None => top_k,
        };

        let db = Arc::clone(&self.db);
        let store = Arc::clone(&self.store);
        let embedder = Arc::clone(&self.embedder);
        let planner = Arc::clone(&self.planner);
        let reranker = self.reranker.clone();
        let embed_text = format!("{}{text}", self.settings.query_prefix);
        let text = text.to_string();

        let hits = tokio::task::spawn_blocking(move || -> Result<Vec<QueryHit>> {
            let query_vector = embedder.embed(&embed_text)?;

            let candidates = {
                let db = db.blocking_lock();
                planner.plan(&RepositoryIndex::new(&db, &info.name), &query_vector, pool)?
            };
            debug!("{} candidates for {:?}", candidates.len(), text);

            let ranked = match reranker {
                Some(reranker) => reranker.rerank(&text, candidates, top_k),
                None => {
                    let mut candidates = candidates;
                    candidates.truncate(top_k);
                    candidates
                }
            };

            let root = Path::new(&info.source_root);
            Ok(ranked
                .into_iter()
                .map(|c| to_hit(&store, &info.name, root, c))
                .collect())
        })
        .await??;

        info!("Query on {repo} returned {} hits", hits.len());
        Ok(hits)
    }
}

fn to_hit(store: &ChunkStore, repo: &str, root: &Path, c: SearchCandidate) -> QueryHit {
    let code = store.fetch_code(repo, root, &c.file_path, c.start_line, c.end_line);
    QueryHit {
        language: detect_display_language(&c.file_path).to_string(),
        file_path: c.file_path,
        start_line: c.start_line,
        end_line: c.end_line,
        similarity_score: c.similarity,
        rerank_score: c.rerank_score,
        code,
    }
}
