//! # Dossier CLI (`dossier`)
//!
//! The `dossier` binary drives the whole service from the command line:
//!
//! - `dossier ingest` — chunk, embed, and index the document collection
//! - `dossier serve` — start the HTTP API
//! - `dossier ask "<query>"` — one-shot question answering
//! - `dossier documents` — list the scanned collection
//!
//! All commands read `./dossier.toml` unless `--config` points elsewhere.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use dossier::agent::Agent;
use dossier::config::{load_config, Config};
use dossier::documents::{ingest, scan_documents};
use dossier::embedding::{EmbeddingCache, HttpEmbeddingClient};
use dossier::index::VectorIndex;
use dossier::llm::HttpChatClient;
use dossier::retrieval::RetrievalEngine;
use dossier::server::run_server;
use dossier::session::SessionStore;

#[derive(Parser)]
#[command(name = "dossier", version, about = "Document-grounded question answering")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = "./dossier.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed, and index the document collection
    Ingest {
        /// Ingest this directory instead of the configured root
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Scan and chunk only; skip embedding, indexing, and saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Start the HTTP API server
    Serve,

    /// Ask a single question from the command line
    Ask {
        /// The question to answer
        query: String,

        /// Continue an existing session
        #[arg(long)]
        session: Option<String>,
    },

    /// List the document collection
    Documents,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dossier=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Ingest { dir, dry_run } => run_ingest(&config, dir.as_deref(), dry_run).await,
        Command::Serve => serve(config).await,
        Command::Ask { query, session } => ask_once(&config, &query, session.as_deref()).await,
        Command::Documents => list_documents(&config),
    }
}

async fn run_ingest(
    config: &Config,
    dir: Option<&std::path::Path>,
    dry_run: bool,
) -> Result<()> {
    let cache = EmbeddingCache::new(Arc::new(HttpEmbeddingClient::new(&config.llm)?));
    let index = VectorIndex::load(&config.index.path, config.llm.dims)?;

    let summary = ingest(config, &cache, &index, dir, dry_run).await?;

    if dry_run {
        println!(
            "Dry run: {} documents would produce {} chunks",
            summary.documents, summary.chunks
        );
    } else {
        println!(
            "Ingested {} documents ({} chunks, {} embedded, {} degraded)",
            summary.documents, summary.chunks, summary.embedded, summary.degraded
        );
        println!("Index now holds {} chunks", index.len());
    }
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let agent = Arc::new(build_agent(&config)?);
    run_server(config, agent).await
}

async fn ask_once(config: &Config, query: &str, session: Option<&str>) -> Result<()> {
    let agent = build_agent(config)?;
    let outcome = agent.ask(query, session).await?;

    println!("{}", outcome.answer);
    if !outcome.sources.is_empty() {
        println!("\nSources: {}", outcome.sources.join(", "));
    }
    println!("\nSession: {}", outcome.session_id);
    Ok(())
}

fn list_documents(config: &Config) -> Result<()> {
    let documents = scan_documents(&config.documents)?;
    if documents.is_empty() {
        println!("No documents found under {}", config.documents.root.display());
        return Ok(());
    }
    for doc in &documents {
        println!("{}\t{}", doc.name, doc.path);
    }
    println!("\n{} documents", documents.len());
    Ok(())
}

/// Wire the full pipeline from configuration: HTTP clients, cache, index
/// snapshot, retrieval engine, session store, and the agent on top.
fn build_agent(config: &Config) -> Result<Agent> {
    let embedder = Arc::new(HttpEmbeddingClient::new(&config.llm)?);
    let cache = Arc::new(EmbeddingCache::new(embedder));
    let index = Arc::new(VectorIndex::load(&config.index.path, config.llm.dims)?);

    tracing::info!(
        chunks = index.len(),
        dims = index.dims(),
        "vector index loaded"
    );

    let retrieval = RetrievalEngine::new(index, cache, config.retrieval.clone());
    let sessions = Arc::new(SessionStore::with_timeout_minutes(
        config.session.timeout_minutes,
    ));
    let chat = Arc::new(HttpChatClient::new(&config.llm)?);

    Ok(Agent::new(
        chat,
        retrieval,
        sessions,
        config.server.max_query_length,
        config.session.max_context_messages,
    ))
}
