use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a chunk was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    SyntaxUnit,
    FallbackWindow,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::SyntaxUnit => "syntax_unit",
            ChunkKind::FallbackWindow => "fallback_window",
        }
    }
}

/// The unit of retrieval. Line numbers are 0-indexed and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub repo_name: String,
    /// Path relative to the repository root, `/`-separated.
    pub file_path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: ChunkKind,
    /// Grammar node kind for syntax units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl Chunk {
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    /// Text handed to the embedder: the file path gives the model some
    /// context the raw lines lack.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.file_path, self.content)
    }
}

/// A nearest-neighbour hit, optionally rescored by the reranker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchCandidate {
    pub chunk_id: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: Option<String>,
    pub content: String,
    /// Cosine similarity to the query embedding.
    pub similarity: f32,
    pub rerank_score: Option<f32>,
}

impl SearchCandidate {
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// A repository with a fully built index.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryInfo {
    pub name: String,
    /// Locator the repository was ingested from.
    pub source: String,
    /// Directory the chunked files were read from.
    pub source_root: String,
    /// Chunks in the persisted chunk set.
    pub chunk_count: usize,
    /// Chunks that made it into the vector index.
    pub indexed_count: usize,
    pub dimensions: usize,
    pub indexed_at: DateTime<Utc>,
}
