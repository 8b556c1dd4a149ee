//! # Shelfmark CLI (`shelf`)
//!
//! The `shelf` binary is the primary interface for Shelfmark. It provides
//! commands for database initialization, seeding the reference corpus,
//! predicting categories and tags, validating and committing product edits,
//! browsing the audit log, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Create the SQLite database and run schema migrations |
//! | `shelf seed corpus <csv>` | Load categorized books into the corpus |
//! | `shelf seed categories <tsv>` | Load the numeric category directory |
//! | `shelf seed samples` | Load a small built-in corpus |
//! | `shelf stats` | Show table counts and the category mapping |
//! | `shelf predict "<title>"` | Predict a category and tags |
//! | `shelf validate <json>` | Run the validation rules on a payload |
//! | `shelf commit <json>` | Validate and push an edit to the catalog |
//! | `shelf records` | List commit attempts |
//! | `shelf serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! shelf init
//! shelf seed samples
//! shelf predict "Rails of Aotearoa" --author "Murray Cole"
//! shelf predict "Alpine Railway Journeys" --ai --top-k 5
//! shelf records --account 1 --title tides
//! shelf serve
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`). Logs go to stderr so
//! `--json` output stays machine readable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelfmark::commands::{self, SeedSource};
use shelfmark::{config, migrate, server, stats};
use shelfmark_core::store::AuditQuery;

/// Shelfmark CLI: category and tag prediction for a book catalog.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/shelf.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Shelfmark: category and tag prediction for a book catalog",
    version,
    long_about = "Shelfmark predicts a taxonomy category and a ranked tag list for a book \
    from a reference corpus, optionally refined by a constrained LLM, and gates catalog \
    edits behind validation rules with an append-only audit log."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/shelf.toml`.
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Running it
    /// more than once is safe.
    Init,

    /// Load reference data.
    Seed {
        #[command(subcommand)]
        source: SeedCommand,
    },

    /// Show table counts and the category mapping built from the corpus.
    Stats,

    /// Predict a category and ranked tags for a book.
    Predict {
        /// Book title.
        title: String,

        /// Book author.
        #[arg(long)]
        author: Option<String>,

        /// Number of tags to return (defaults to `[predict].top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Allow the LLM tier for books that are not in the corpus.
        #[arg(long)]
        ai: bool,

        /// Print the API response JSON.
        #[arg(long)]
        json: bool,
    },

    /// Validate a product payload read from a JSON file.
    Validate {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Validate a payload and, if it passes, push it to the catalog.
    ///
    /// Every attempt is recorded, including rejected ones.
    Commit {
        file: PathBuf,

        /// Catalog account id (see `[[catalog.accounts]]`).
        #[arg(long)]
        account: i64,

        /// Product id, numeric or a full product gid.
        #[arg(long)]
        product: String,

        #[arg(long)]
        json: bool,
    },

    /// List commit attempts, newest first.
    Records {
        #[arg(long)]
        account: Option<i64>,

        /// Show a single record.
        #[arg(long)]
        id: Option<i64>,

        /// Case-insensitive title filter.
        #[arg(long)]
        title: Option<String>,

        /// Zero-based page index.
        #[arg(long, default_value_t = 0)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        size: usize,

        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum SeedCommand {
    /// Load `title,author,category,tags` rows from a CSV file.
    Corpus { path: PathBuf },
    /// Load `<id>\t<path>` rows from a TSV file. Existing ids are kept.
    Categories { path: PathBuf },
    /// Load a small built-in corpus.
    Samples,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Seed { source } => {
            let source = match &source {
                SeedCommand::Corpus { path } => SeedSource::Corpus(path),
                SeedCommand::Categories { path } => SeedSource::Categories(path),
                SeedCommand::Samples => SeedSource::Samples,
            };
            commands::run_seed(&cfg, source).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Predict {
            title,
            author,
            top_k,
            ai,
            json,
        } => {
            commands::run_predict(&cfg, &title, author.as_deref(), top_k, ai, json).await?;
        }
        Commands::Validate { file, json } => {
            commands::run_validate(&cfg, &file, json).await?;
        }
        Commands::Commit {
            file,
            account,
            product,
            json,
        } => {
            commands::run_commit(&cfg, account, &product, &file, json).await?;
        }
        Commands::Records {
            account,
            id,
            title,
            page,
            size,
            json,
        } => {
            let query = AuditQuery {
                account_id: account,
                id,
                title,
                page,
                size,
            };
            commands::run_records(&cfg, query, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
