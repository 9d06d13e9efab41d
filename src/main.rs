//! # LedgerLens CLI (`lens`)
//!
//! The `lens` binary is the primary interface for LedgerLens. It provides
//! commands for database initialization, document ingestion, search,
//! grounded question answering, expense analysis, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! lens --config ./config/lens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lens init` | Create the SQLite database and run schema migrations |
//! | `lens ingest <path>` | Chunk, embed, and index a text document |
//! | `lens search "<query>"` | Semantic search over indexed chunks |
//! | `lens ask "<question>"` | Answer a question grounded in indexed documents |
//! | `lens analyze` | Extract and categorize transactions from documents |
//! | `lens set-category <id> <category>` | Manually override a transaction's category |
//! | `lens summary` | Spending breakdown by category |
//! | `lens stats` | Database counts and health overview |
//! | `lens get <id>` | Inspect a document and its chunks |
//! | `lens clear` | Reset the index (requires `--yes`) |
//! | `lens serve` | Start the JSON HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ledgerlens::cancel::CancelToken;
use ledgerlens::{
    analyze, ask, clear, config, db, get, ingest, migrate, reconcile, search, server, stats,
    summary,
};

/// LedgerLens CLI: a local-first retrieval and expense-categorization
/// engine for financial documents.
#[derive(Parser)]
#[command(
    name = "lens",
    about = "LedgerLens: local-first retrieval and expense categorization for financial documents",
    version,
    long_about = "LedgerLens ingests financial documents into a SQLite vector index, answers \
    questions grounded in their content, and extracts and categorizes transactions into a fixed \
    category set, all from a single database file."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent;
    /// running it again is safe.
    Init,

    /// Chunk, embed, and index a text document.
    ///
    /// Re-ingesting a file with the same name replaces its chunks in place.
    /// Requires an embedding provider.
    Ingest {
        /// Path to a .txt or .md file.
        path: PathBuf,
    },

    /// Semantic search over indexed chunks.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Answer a question grounded in indexed documents.
    ///
    /// Retrieves the most relevant chunks, assembles them under the context
    /// token budget, and asks the generation provider. Requires both an
    /// embedding and a generation provider.
    Ask {
        /// The question to answer.
        question: String,

        /// Answer verbosity: brief, balanced, or detailed.
        #[arg(long, default_value = "balanced")]
        length: String,
    },

    /// Extract transactions from indexed documents and categorize them.
    ///
    /// Re-runnable: known transactions are refreshed, manual overrides are
    /// left untouched.
    Analyze,

    /// Manually override a transaction's category.
    ///
    /// Pins confidence at 1.0 and freezes the row against future analysis.
    SetCategory {
        /// Transaction id.
        id: String,

        /// One of the fixed category names, e.g. "Food & Dining".
        category: String,
    },

    /// Spending breakdown by category (debits only).
    Summary,

    /// Database counts and health overview.
    Stats,

    /// Inspect a document and its chunks by id or filename.
    Get {
        /// Document id or filename.
        id: String,
    },

    /// Delete all documents, chunks, and vectors.
    Clear {
        /// Also delete stored transactions.
        #[arg(long)]
        transactions: bool,

        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Start the JSON HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run(&pool).await?;
            println!("Database initialized at {}", config.db.path.display());
            pool.close().await;
        }
        Commands::Ingest { path } => {
            let cancel = CancelToken::new();
            spawn_ctrl_c_handler(cancel.clone());
            ingest::run_ingest(&config, &path, &cancel).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&config, &query, limit).await?;
        }
        Commands::Ask { question, length } => {
            ask::run_ask(&config, &question, &length).await?;
        }
        Commands::Analyze => {
            let cancel = CancelToken::new();
            spawn_ctrl_c_handler(cancel.clone());
            analyze::run_analyze(&config, &cancel).await?;
        }
        Commands::SetCategory { id, category } => {
            let pool = db::connect(&config).await?;
            let updated = reconcile::override_category(&pool, &id, &category).await?;
            println!(
                "{} -> {} (confidence 1.0, overridden)",
                updated.id,
                updated.category.label()
            );
            pool.close().await;
        }
        Commands::Summary => {
            summary::run_summary(&config).await?;
        }
        Commands::Stats => {
            stats::run_stats(&config).await?;
        }
        Commands::Get { id } => {
            get::run_get(&config, &id).await?;
        }
        Commands::Clear { transactions, yes } => {
            clear::run_clear(&config, transactions, yes).await?;
        }
        Commands::Serve => {
            server::run_server(&config).await?;
        }
    }

    Ok(())
}

/// Flip the cancel token on Ctrl-C so long pipelines stop at their next
/// checkpoint instead of being killed mid-write.
fn spawn_ctrl_c_handler(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, finishing current step...");
            cancel.cancel();
        }
    });
}
