//! The ingest operation: locator in, queryable repository index out.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};

use super::acquire::{self, Checkout};
use super::files::collect_source_files;
use super::resolver::ChunkResolver;
use crate::config::Config;
use crate::db::Db;
use crate::db::models::{Chunk, RepositoryInfo};
use crate::db::repos::NewRepository;
use crate::embedder::Embedder;
use crate::embedder::batch::{RetryPolicy, embed_texts};
use crate::error::{Error, Result};
use crate::store::ChunkStore;

/// Outcome of one ingest call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub success: bool,
    pub repo_name: String,
    pub message: String,
    pub chunk_count: usize,
    pub indexed_count: usize,
    pub already_indexed: bool,
}

/// Settings the ingest pipeline needs from [`Config`].
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub repos_dir: PathBuf,
    pub keep_clones: bool,
    pub extensions: Vec<String>,
    pub ignored_dirs: Vec<String>,
    pub retry: RetryPolicy,
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            repos_dir: config.repos_dir(),
            keep_clones: config.keep_clones,
            extensions: config.chunking.extensions.clone(),
            ignored_dirs: config.chunking.ignored_dirs.clone(),
            retry: config.retry_policy(),
        }
    }
}

/// Removes a repository name from the in-flight set when dropped.
struct InFlight<'a> {
    names: &'a Mutex<HashSet<String>>,
    name: String,
}

impl<'a> InFlight<'a> {
    fn claim(names: &'a Mutex<HashSet<String>>, name: &str) -> Result<Self> {
        let mut set = names.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(name.to_string()) {
            return Err(Error::IngestInProgress(name.to_string()));
        }
        Ok(Self {
            names,
            name: name.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut set = self.names.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.name);
    }
}

/// Chunks and vectors of one repository, ready to be written.
struct Prepared {
    checkout: Checkout,
    source: String,
    source_root: String,
    chunks: Vec<Chunk>,
    embeddings: Vec<Option<Vec<f32>>>,
}

pub struct Indexer {
    db: Arc<TokioMutex<Db>>,
    store: Arc<ChunkStore>,
    embedder: Arc<dyn Embedder>,
    resolver: Arc<ChunkResolver>,
    options: IngestOptions,
    in_flight: Mutex<HashSet<String>>,
}

impl Indexer {
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        store: Arc<ChunkStore>,
        embedder: Arc<dyn Embedder>,
        resolver: Arc<ChunkResolver>,
        options: IngestOptions,
    ) -> Self {
        Self {
            db,
            store,
            embedder,
            resolver,
            options,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn already_indexed(name: &str, chunk_count: usize, indexed_count: usize) -> IngestReport {
        IngestReport {
            success: true,
            repo_name: name.to_string(),
            message: format!("repository '{name}' is already indexed"),
            chunk_count,
            indexed_count,
            already_indexed: true,
        }
    }

    async fn existing(&self, name: &str) -> Result<Option<IngestReport>> {
        let db = self.db.lock().await;
        Ok(db
            .repository(name)?
            .map(|info| Self::already_indexed(name, info.chunk_count, info.indexed_count)))
    }

    /// Index the repository at `locator`.
    ///
    /// A repository whose derived name already has an index is skipped, not
    /// merged. Concurrent ingests of the same name are rejected.
    pub async fn ingest(&self, locator: &str) -> Result<IngestReport> {
        let name = acquire::derive_repo_name(locator)?;

        if let Some(report) = self.existing(&name).await? {
            info!("Skipping {name}: already indexed");
            return Ok(report);
        }

        let _claim = InFlight::claim(&self.in_flight, &name)?;
        // Another ingest may have finished between the check and the claim.
        if let Some(report) = self.existing(&name).await? {
            return Ok(report);
        }

        info!("Ingesting {name} from {locator}");
        let prepared = {
            let locator = locator.to_string();
            let embedder = Arc::clone(&self.embedder);
            let resolver = Arc::clone(&self.resolver);
            let options = self.options.clone();
            tokio::task::spawn_blocking(move || {
                prepare(&locator, embedder.as_ref(), &resolver, &options)
            })
            .await??
        };

        let db = Arc::clone(&self.db);
        let store = Arc::clone(&self.store);
        let checkout = prepared.checkout.clone();
        let inserted = tokio::task::spawn_blocking(move || commit(&db, &store, &prepared)).await;

        if !self.options.keep_clones {
            acquire::cleanup(&checkout);
        }
        let info = inserted??;
        self.store.cache().invalidate(&name);

        info!(
            "Indexed {name}: {} chunks, {} embedded",
            info.chunk_count, info.indexed_count
        );
        Ok(IngestReport {
            success: true,
            repo_name: name.clone(),
            message: format!("repository '{name}' indexed"),
            chunk_count: info.chunk_count,
            indexed_count: info.indexed_count,
            already_indexed: false,
        })
    }

    /// Drop a repository's index and chunk set so it can be ingested again.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let _claim = InFlight::claim(&self.in_flight, name)?;
        let existed = self.db.lock().await.delete_repository(name)?;

        let path = self.store.path(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        self.store.cache().invalidate(name);

        if existed {
            info!("Removed index of {name}");
        }
        Ok(existed)
    }
}

/// Build the index, then persist the chunk set. A chunk set that cannot be
/// written takes the fresh index down with it. Runs on a blocking thread.
fn commit(
    db: &TokioMutex<Db>,
    store: &ChunkStore,
    prepared: &Prepared,
) -> Result<RepositoryInfo> {
    let name = prepared.checkout.name.as_str();
    let mut db = db.blocking_lock();
    let info = db.insert_repository(
        &NewRepository {
            name,
            source: &prepared.source,
            source_root: &prepared.source_root,
        },
        &prepared.chunks,
        &prepared.embeddings,
    )?;

    if let Err(e) = store.save(name, &prepared.chunks) {
        warn!("{name}: chunk set not saved, dropping index: {e}");
        db.delete_repository(name)?;
        return Err(e);
    }
    Ok(info)
}

/// Acquire, chunk and embed. Runs on a blocking thread.
fn prepare(
    locator: &str,
    embedder: &dyn Embedder,
    resolver: &ChunkResolver,
    options: &IngestOptions,
) -> Result<Prepared> {
    let checkout = acquire::acquire(locator, &options.repos_dir)?;

    let result = chunk_and_embed(&checkout, embedder, resolver, options);
    if result.is_err() && !options.keep_clones {
        acquire::cleanup(&checkout);
    }
    let (chunks, embeddings) = result?;

    let source_root = checkout
        .root
        .canonicalize()
        .unwrap_or_else(|_| checkout.root.clone())
        .to_string_lossy()
        .into_owned();

    Ok(Prepared {
        checkout,
        source: locator.trim().to_string(),
        source_root,
        chunks,
        embeddings,
    })
}

fn chunk_and_embed(
    checkout: &Checkout,
    embedder: &dyn Embedder,
    resolver: &ChunkResolver,
    options: &IngestOptions,
) -> Result<(Vec<Chunk>, Vec<Option<Vec<f32>>>)> {
    let files = collect_source_files(&checkout.root, &options.extensions, &options.ignored_dirs);
    info!("{}: {} files to chunk", checkout.name, files.len());

    let chunks = resolver.resolve_repository(&checkout.name, &files);

    let texts: Vec<String> = chunks.iter().map(Chunk::embedding_text).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let embeddings = embed_texts(embedder, &refs, &options.retry);

    let embedded = embeddings.iter().filter(|e| e.is_some()).count();
    if embedded == 0 {
        return Err(Error::NoEmbeddings(checkout.name.clone()));
    }
    if embedded < chunks.len() {
        warn!(
            "{}: {} of {} chunks could not be embedded and are not searchable",
            checkout.name,
            chunks.len() - embedded,
            chunks.len()
        );
    }
    Ok((chunks, embeddings))
}
