//! MCP surface: stdio server plus ingest/query/list tool handlers.
pub mod server;
pub mod tools;
