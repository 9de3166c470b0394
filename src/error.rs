//! Error types shared by ingestion and query paths.

use crate::embedder::EmbedderError;

/// Errors surfaced by the ingest, query and list operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The repository could not be fetched or is not a usable source tree.
    #[error("repository acquisition failed: {0}")]
    Acquisition(String),

    /// No index has been built for the named repository yet.
    #[error("repository '{0}' is not indexed yet")]
    NotIndexed(String),

    /// Another ingest for the same repository is still running.
    #[error("ingestion of '{0}' is already in progress")]
    IngestInProgress(String),

    /// Every chunk failed to embed, so there is nothing to index.
    #[error("no chunk of '{0}' could be embedded")]
    NoEmbeddings(String),

    /// Rejected query input (empty text, zero result count).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Tree-sitter could not produce a syntax tree.
    #[error("parse failed: {0}")]
    Parse(String),

    /// A vector does not match the index width.
    #[error("vector has {actual} dimensions, index expects {expected}")]
    Dimension { expected: usize, actual: usize },

    /// Chunks and embedding slots of one build do not line up.
    #[error("{chunks} chunks but {embeddings} embedding slots")]
    EmbeddingCount { chunks: usize, embeddings: usize },

    #[error("embedding error: {0}")]
    Embedder(#[from] EmbedderError),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking worker panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
