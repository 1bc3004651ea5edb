//! # Aula Retrieval CLI (`aula`)
//!
//! The `aula` binary indexes a corpus of teaching documents and runs the
//! gated search against it.
//!
//! ## Usage
//!
//! ```bash
//! aula --config ./config/aula.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `aula index` | Index the corpus if its fingerprints changed |
//! | `aula reindex` | Drop the collection and rebuild it |
//! | `aula search "<query>"` | Run the gated search |
//! | `aula stats` | Show chunk totals per subject |
//! | `aula diagnostics` | Print files, probe results and cache state as JSON |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use aula_retrieval::config::load_config;
use aula_retrieval::system::RetrievalSystem;
use aula_retrieval::{diagnostics, indexer, search, stats};

/// Aula Retrieval CLI: local retrieval for children's educational Q&A.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/aula.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "aula",
    about = "Local retrieval for children's educational Q&A",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/aula.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the corpus, reusing the existing index when nothing changed.
    Index {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Drop the collection and rebuild it from the corpus.
    Reindex {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search the index.
    ///
    /// Small talk and very short queries are answered without a search.
    /// Weak matches return no context.
    Search {
        /// The question to search for.
        query: String,

        /// Number of nearest chunks to consider.
        #[arg(long)]
        results: Option<usize>,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show chunk totals per subject.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Print a diagnostics report as JSON.
    Diagnostics,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let cfg = load_config(&cli.config)?;
    let system = RetrievalSystem::new(cfg).await?;

    match cli.command {
        Commands::Index { json } => {
            indexer::run_index(&system, false, json).await?;
        }
        Commands::Reindex { json } => {
            indexer::run_index(&system, true, json).await?;
        }
        Commands::Search {
            query,
            results,
            json,
        } => {
            system.initialize().await?;
            search::run_search(&system, &query, results, json).await?;
        }
        Commands::Stats { json } => {
            system.initialize().await?;
            stats::run_stats(&system, json).await?;
        }
        Commands::Diagnostics => {
            system.initialize().await?;
            diagnostics::run_diagnostics(&system).await?;
        }
    }

    Ok(())
}
