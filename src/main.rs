use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use repoqna::app::App;
use repoqna::config::Config;
use repoqna::mcp::server::{McpContext, McpServer};

#[derive(Parser)]
#[command(name = "repoqna")]
#[command(author, version, about = "Natural-language code search over source repositories")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config.json
    #[arg(short, long, global = true, default_value = "")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server on stdio
    Serve,

    /// Index a repository (git URL or local directory)
    Ingest { source: String },

    /// Search an indexed repository
    Query {
        repo: String,
        query: String,
        /// Max results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// List indexed repositories
    List,

    /// Drop a repository's index
    Remove { repo: String },
}

fn init_tracing() {
    // stdout belongs to the MCP transport.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load(&cli.config)?;
    // Model loading may block on downloads.
    let app = tokio::task::spawn_blocking(move || App::open(config))
        .await
        .context("startup task failed")??;
    let app = Arc::new(app);

    match cli.command {
        Commands::Serve => {
            info!("Starting repoqna MCP server...");
            McpServer::new(McpContext { app }).start().await?;
        }
        Commands::Ingest { source } => {
            let report = app.indexer.ingest(&source).await?;
            print_json(&report)?;
        }
        Commands::Query { repo, query, top_k } => {
            let hits = app.engine.query(&repo, &query, top_k).await?;
            print_json(&hits)?;
        }
        Commands::List => {
            let repos = app.engine.list().await?;
            print_json(&repos)?;
        }
        Commands::Remove { repo } => {
            if !app.indexer.remove(&repo).await? {
                anyhow::bail!("repository '{repo}' is not indexed");
            }
            info!("Removed {repo}");
        }
    }

    Ok(())
}
