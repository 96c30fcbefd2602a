//! # Semdex: semantic chunk store CLI
//!
//! Usage:
//!   semdex init                          # Create schema, build the ANN index
//!   semdex index notes.md paper.txt      # Chunk, annotate, and store documents
//!   semdex search "Who is Frodo?" -n 3   # Entity-aware similarity search
//!   semdex stats                         # Chunk counts and index status
//!   semdex reset                         # Drop every stored chunk

use anyhow::Result;
use clap::{Parser, Subcommand};
use semdex_core::SemdexConfig;
use semdex_retriever::{
    CapitalizedEntityExtractor, DocumentIndexer, HashingEmbedder, IngestReport, ParagraphChunker,
    Retriever, doc_name_from_path, format_results,
};
use semdex_store::{IndexStatus, StoreHandle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "semdex", version, about = "Semantic chunk store with entity-aware retrieval")]
struct Cli {
    /// Config file (default: <data dir>/semdex/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overrides config and SEMDEX_DB_PATH
    #[arg(long, global = true)]
    db: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the chunk table and build the ANN index
    Init,
    /// Index text documents
    Index {
        /// Files to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Document name (default: file name); only valid with a single path
        #[arg(long)]
        doc_name: Option<String>,
    },
    /// Search indexed chunks
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short = 'n', long)]
        max_results: Option<usize>,
        /// Restrict to one document
        #[arg(long)]
        doc: Option<String>,
    },
    /// Show stored documents and index state
    Stats,
    /// Drop every stored chunk and recreate the schema
    Reset,
}

fn load_config(cli: &Cli) -> Result<SemdexConfig> {
    let config = match &cli.config {
        Some(path) => SemdexConfig::load_from(path)?,
        None => SemdexConfig::load()?,
    };
    let mut config = config.with_env_overrides();
    if let Some(db) = &cli.db {
        config.storage.path = db.clone();
    }
    Ok(config)
}

fn describe(status: &IndexStatus) -> String {
    match status {
        IndexStatus::NotBuilt => "not built".into(),
        IndexStatus::Ready { points } => format!("HNSW ready ({points} points)"),
        IndexStatus::Unavailable { reason } => format!("unavailable, exact scan ({reason})"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "semdex=debug,semdex_store=debug,semdex_retriever=debug"
    } else {
        "semdex=info,semdex_store=info,semdex_retriever=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(&cli)?;
    let handle = StoreHandle::from_config(&config);
    let store = handle.acquire()?;

    let dim = config.vector_index.embedding_dim;
    let embedder = Arc::new(HashingEmbedder::new(dim)?);
    let extractor = Arc::new(CapitalizedEntityExtractor);

    match cli.command {
        Command::Init => {
            println!("Store: {}", config.storage.path);
            println!("Chunks: {}", store.count()?);
            println!("Index: {}", describe(&store.index_status()?));
        }
        Command::Index { paths, doc_name } => {
            if doc_name.is_some() && paths.len() > 1 {
                anyhow::bail!("--doc-name can only be used with a single path");
            }
            let indexer = DocumentIndexer::new(
                Arc::clone(&store),
                Arc::new(ParagraphChunker::default()),
                embedder,
                extractor,
            );
            for path in &paths {
                let name = doc_name
                    .clone()
                    .unwrap_or_else(|| doc_name_from_path(&path.to_string_lossy()));
                let report = match std::fs::read_to_string(path) {
                    Ok(text) => indexer.index_or_report(&name, &text),
                    Err(e) => {
                        tracing::warn!("Failed to convert document {}: {e}", path.display());
                        IngestReport::conversion_failed(&name, e.to_string())
                    }
                };
                println!("{}\n", report.summary());
            }
        }
        Command::Search { query, max_results, doc } => {
            let retriever = Retriever::new(store.clone(), embedder, extractor);
            let max_results = max_results.unwrap_or(config.retrieval.max_results);
            let results = retriever.search(&query, max_results, doc.as_deref())?;
            if results.is_empty() {
                println!("No documents have been indexed yet, or nothing matched.");
            } else {
                println!("{}", format_results(&results));
            }
        }
        Command::Stats => {
            println!("Chunks: {}", store.count()?);
            println!("Index: {}", describe(&store.index_status()?));
            for (doc, count) in store.documents()? {
                println!("  {doc}: {count}");
            }
        }
        Command::Reset => {
            let report = store.reset_schema()?;
            println!("Store reset. Index: {}", describe(&report.index));
        }
    }

    drop(store);
    handle.close();
    Ok(())
}
