//! # Civic RAG CLI (`civic`)
//!
//! Builds the vector index over the public-services corpus and answers
//! questions against it.
//!
//! ## Usage
//!
//! ```bash
//! civic --config ./config/civic.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `civic init` | Create the SQLite index and schema |
//! | `civic build [--reset]` | Load, chunk, embed and index the corpus |
//! | `civic search "<question>"` | Retrieval only, ranked hits |
//! | `civic ask "<question>"` | Retrieve and generate an answer |
//! | `civic collections` | List collections, sizes and fingerprints |
//! | `civic serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # First build, or after changing the embedding model or chunking
//! civic build --reset --config ./config/civic.toml
//!
//! # Check retrieval before wiring up the model
//! civic search "documents for a residency certificate" --k 5
//!
//! civic ask "what does a tenant need for a residency certificate?"
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` level);
//! command output goes to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use civic_rag::{builder, config, query, server, stats, store::SqliteIndex};

/// Civic RAG: question answering over government-service documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/civic.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "civic",
    about = "Retrieval-augmented question answering over government-service documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/civic.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index database and schema. Safe to run repeatedly.
    Init,

    /// Build the vector index from the corpus.
    ///
    /// Without `--reset` the build upserts into the existing collection and
    /// refuses to run if the collection was built with a different embedding
    /// model or chunk configuration.
    Build {
        /// Drop and recreate the collection first.
        #[arg(long)]
        reset: bool,

        /// Corpus directory (overrides `[corpus] root`).
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Collection name (overrides `[collection] name`).
        #[arg(long)]
        collection: Option<String>,
    },

    /// Retrieve the chunks nearest to a question, without generating.
    Search {
        question: String,

        /// Number of chunks to retrieve (defaults to `[retrieval] top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a question from the indexed corpus.
    Ask {
        question: String,

        /// Number of chunks to retrieve (defaults to `[retrieval] top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// List collections with entry counts and fingerprints.
    Collections,

    /// Start the HTTP server on `[server] bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let index = SqliteIndex::open(&cfg.db.path).await?;
            index.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Build {
            reset,
            corpus,
            collection,
        } => {
            builder::run_build(&cfg, reset, corpus, collection).await?;
        }
        Commands::Search { question, k } => {
            query::run_search(&cfg, &question, k).await?;
        }
        Commands::Ask { question, k } => {
            query::run_ask(&cfg, &question, k).await?;
        }
        Commands::Collections => {
            stats::run_collections(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
