//! LegalFlash service binary.
//!
//! `legalflash serve` starts the HTTP API; `legalflash ingest` builds a
//! knowledge base from a text file so an empty deployment can be brought
//! up without external tooling.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use legalflash_core::{AppConfig, StoreCategory};
use legalflash_query::embedder::FastEmbedder;
use legalflash_query::store::PersistedVectorStore;
use legalflash_server::{routes, AppContext};

#[derive(Debug, Parser)]
#[command(name = "legalflash", about = "Retrieval-augmented legal question answering")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP API (the default).
    Serve,
    /// Build one category's knowledge base from a UTF-8 text file.
    Ingest {
        /// Knowledge base category: law, case, or judgement.
        #[arg(long)]
        category: StoreCategory,
        /// Source text file to split, embed, and persist.
        #[arg(long)]
        source: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    match Cli::parse().command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Ingest { category, source } => ingest(config, category, &source).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr.clone();
    let context = AppContext::initialize(config)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("LegalFlash-RAG API listening on {bind_addr}");
    axum::serve(listener, routes::router(context)).await?;
    Ok(())
}

async fn ingest(config: AppConfig, category: StoreCategory, source: &Path) -> anyhow::Result<()> {
    let embedder = FastEmbedder::new(&config.embedding_model)?;
    let dir = config.store_dir(category);
    let count = PersistedVectorStore::ingest(source, &dir, category, &embedder).await?;
    info!(
        "{} knowledge base built: {count} chunks at {}",
        category.label(),
        dir.display()
    );
    Ok(())
}
