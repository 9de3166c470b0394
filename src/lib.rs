//! # repoqna: natural-language code search over source repositories
//!
//! Repositories are cut into chunks (syntax units where a grammar is
//! available, overlapping line windows everywhere else), embedded, and
//! stored in a per-repository vector index. Queries page through the index
//! for admissible candidates and optionally rerank them.
//!
//! ## Architecture
//!
//! - **[`indexer`]** - chunk resolution (tree-sitter units, coverage, windows) and ingest
//! - **[`embedder`]** - embedding providers (mock, ONNX BGE-small, HTTP) with batched retry
//! - **[`db`]** - SQLite + sqlite-vec vector index
//! - **[`store`]** - persisted chunk sets and code retrieval
//! - **[`search`]** - paged query planner, reranker, query operation
//! - **[`mcp`]** - MCP server (stdio transport via rmcp)
//! - **[`config`]** - configuration loading and validation
//! - **[`app`]** - wiring from config to running services

pub mod app;
pub mod config;
pub mod db;
pub mod embedder;
pub mod error;
pub mod indexer;
pub mod mcp;
pub mod search;
pub mod store;
