/// MCP tool handlers for repoqna.
///
/// 1. ingest_repository – clone/chunk/embed a repository into an index
/// 2. query_repository  – natural-language search over one repository
/// 3. list_repositories – repositories with a built index
/// 4. remove_repository – drop an index so it can be rebuilt
use crate::error::Error;
use crate::mcp::server::McpContext;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct IngestParams {
    /// Repository URL (https://, git@, ssh://) or local directory path
    source: String,
}

#[derive(Deserialize, JsonSchema)]
struct QueryParams {
    /// Repository name as reported by ingest_repository
    repo: String,
    /// Natural-language question about the code
    query: String,
    /// Max results (default from config)
    top_k: Option<usize>,
}

#[derive(Deserialize, JsonSchema)]
struct RepoParam {
    /// Repository name
    repo: String,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

/// Caller mistakes become tool errors the assistant can read; everything
/// else is an internal error.
fn failure(context: &str, err: Error) -> Result<CallToolResult, McpError> {
    match err {
        Error::NotIndexed(_)
        | Error::InvalidQuery(_)
        | Error::IngestInProgress(_)
        | Error::Acquisition(_)
        | Error::NoEmbeddings(_) => error_result(&err.to_string()),
        other => Err(McpError::internal_error(format!("{context}: {other}"), None)),
    }
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: ingest_repository ───────────────────────────────────

    #[tool(
        description = "Index a source repository for code search. Accepts a git URL or a local directory. Re-ingesting an indexed repository is skipped."
    )]
    async fn ingest_repository(
        &self,
        params: Parameters<IngestParams>,
    ) -> Result<CallToolResult, McpError> {
        let source = params.0.source.trim().to_string();
        if source.is_empty() {
            return error_result("source is required");
        }

        match self.ctx.app.indexer.ingest(&source).await {
            Ok(report) => json_result(serde_json::json!(report)),
            Err(e) => failure("ingest failed", e),
        }
    }

    // ── Tool 2: query_repository ────────────────────────────────────

    #[tool(
        description = "Search an indexed repository with a natural-language query. Returns matching code with file path, line range and score."
    )]
    async fn query_repository(
        &self,
        params: Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.repo.is_empty() {
            return error_result("repo is required");
        }

        match self.ctx.app.engine.query(&p.repo, &p.query, p.top_k).await {
            Ok(hits) => json_result(serde_json::json!({
                "repo": p.repo,
                "results": hits,
            })),
            Err(e) => failure("query failed", e),
        }
    }

    // ── Tool 3: list_repositories ───────────────────────────────────

    #[tool(description = "List repositories that have a built index")]
    async fn list_repositories(&self) -> Result<CallToolResult, McpError> {
        let repos = match self.ctx.app.engine.list().await {
            Ok(repos) => repos,
            Err(e) => return failure("list failed", e),
        };

        let repositories: Vec<serde_json::Value> = repos
            .iter()
            .map(|r| {
                serde_json::json!({
                    "name": r.name,
                    "source": r.source,
                    "chunk_count": r.chunk_count,
                    "indexed_count": r.indexed_count,
                    "indexed_at": r.indexed_at.to_rfc3339(),
                })
            })
            .collect();

        json_result(serde_json::json!({ "repositories": repositories }))
    }

    // ── Tool 4: remove_repository ───────────────────────────────────

    #[tool(description = "Delete a repository's index so it can be ingested again")]
    async fn remove_repository(
        &self,
        params: Parameters<RepoParam>,
    ) -> Result<CallToolResult, McpError> {
        let repo = &params.0.repo;
        if repo.is_empty() {
            return error_result("repo is required");
        }

        match self.ctx.app.indexer.remove(repo).await {
            Ok(true) => json_result(serde_json::json!({ "removed": repo })),
            Ok(false) => error_result(&Error::NotIndexed(repo.clone()).to_string()),
            Err(e) => failure("remove failed", e),
        }
    }
}
