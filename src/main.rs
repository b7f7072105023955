//! # NCM Search CLI (`ncm`)
//!
//! The `ncm` binary manages the NCM nomenclature index and serves search
//! over it: schema setup, seeding, corrections, embedding maintenance,
//! ad-hoc search and the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! ncm --config ./config/ncm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ncm init` | Create the SQLite database and run schema migrations |
//! | `ncm seed <file>` | Bulk load entries from a JSON dataset |
//! | `ncm correct <code> --description ..` | Fix an entry's description |
//! | `ncm search "<query>"` | Rank NCM codes for a product description |
//! | `ncm get <code>` | Show a single entry |
//! | `ncm stats` | Index counts and embedding coverage |
//! | `ncm embed pending` | Embed missing or stale entries |
//! | `ncm embed rebuild` | Delete and regenerate all embeddings |
//! | `ncm serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! ncm init --config ./config/ncm.toml
//! ncm seed ./data/ncm.json --config ./config/ncm.toml
//! ncm embed pending --config ./config/ncm.toml
//! ncm search "notebook 14 polegadas" --limit 5 --config ./config/ncm.toml
//! ncm search 8471.30 --config ./config/ncm.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ncm_search::{config, embed_cmd, get, migrate, search, seed, server, stats};

/// NCM Search CLI: semantic tariff-code search for customs back offices.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ncm.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ncm",
    about = "NCM Search: semantic search over the Mercosur tariff nomenclature",
    version,
    long_about = "NCM Search maps free-text product descriptions to the closest NCM codes. \
    Entries are embedded with an external embedding model and ranked by cosine similarity, \
    with lexical code and description matching as a fallback when embeddings are unavailable."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ncm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `ncm_entries` and
    /// `ncm_vectors` tables. Running it more than once is safe.
    Init,

    /// Bulk load nomenclature entries from a JSON file.
    ///
    /// The file holds an array of `{code, description, chapter?, notes?}`
    /// records. Codes already indexed are skipped.
    Seed {
        /// Path to the JSON dataset.
        file: PathBuf,
    },

    /// Correct an entry's description.
    ///
    /// The entry's embedding becomes stale; run `ncm embed pending` afterwards.
    Correct {
        /// NCM code, with or without dots.
        code: String,

        /// New description text.
        #[arg(long)]
        description: String,

        /// Replace the entry's notes (pass an empty string to clear them).
        #[arg(long)]
        notes: Option<String>,
    },

    /// Search NCM codes for a product description or code.
    Search {
        /// Free text or a (partial) NCM code.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum similarity for semantic matches, between 0 and 1.
        #[arg(long)]
        threshold: Option<f64>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show a single entry by code.
    Get {
        /// NCM code, with or without dots.
        code: String,

        /// Print the entry as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats,

    /// Manage embedding vectors.
    ///
    /// Requires an embedding provider (e.g., OpenAI) to be configured.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Start the HTTP API server.
    Serve,
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed entries that are missing or have stale embeddings.
    Pending {
        /// Maximum number of entries to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config (texts per API call, at most 500).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings.
    ///
    /// Useful when switching embedding models or dimensions.
    Rebuild {
        /// Override the batch size from config (texts per API call, at most 500).
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays parseable (`--json`)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Seed { file } => {
            seed::run_seed(&cfg, &file).await?;
        }
        Commands::Correct {
            code,
            description,
            notes,
        } => {
            seed::run_correct(&cfg, &code, &description, notes.as_deref()).await?;
        }
        Commands::Search {
            query,
            limit,
            threshold,
            json,
        } => {
            search::run_search(&cfg, &query, limit, threshold, json).await?;
        }
        Commands::Get { code, json } => {
            get::run_get(&cfg, &code, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                if let Some(b) = batch_size {
                    cfg.embedding.batch_size = b;
                }
                embed_cmd::run_embed_pending(&cfg, limit, dry_run).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                if let Some(b) = batch_size {
                    cfg.embedding.batch_size = b;
                }
                embed_cmd::run_embed_rebuild(&cfg).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
