//! factlayer CLI — operator tooling over the fact-consistency library.
//!
//! Commands:
//! - `validate` — Run the validator chain over a response
//! - `select`   — Show which vault sections a query would use
//! - `budget`   — Enforce token ceilings over context files
//! - `facts`    — Seed and inspect a SQLite fact store

use clap::{Parser, Subcommand};
use factlayer_core::ChatMode;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "factlayer",
    about = "factlayer — fact-consistency tooling for LLM responses",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.factlayer/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the validator chain over a generated response
    Validate {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        query: String,

        #[arg(short, long)]
        response: String,

        /// Chat mode used for retrieval
        #[arg(short, long, default_value = "standard")]
        mode: ChatMode,

        /// SQLite fact store (overrides the configured path)
        #[arg(long)]
        db: Option<String>,
    },

    /// Select vault sections for a query
    Select {
        /// Vault text file
        #[arg(long)]
        vault: PathBuf,

        #[arg(short, long)]
        query: String,
    },

    /// Apply per-source token ceilings to context files
    Budget {
        #[arg(long)]
        memory: Option<PathBuf>,

        #[arg(long)]
        documents: Option<PathBuf>,

        #[arg(long)]
        vault: Option<PathBuf>,
    },

    /// Manage the SQLite fact store
    Facts {
        #[command(subcommand)]
        action: FactsAction,

        /// SQLite fact store (overrides the configured path)
        #[arg(long, global = true)]
        db: Option<String>,
    },
}

#[derive(Subcommand)]
enum FactsAction {
    /// Store a new fact
    Add {
        #[arg(short, long)]
        user: String,

        content: String,

        #[arg(long, default_value = "")]
        category: String,

        /// Metadata as a JSON object, e.g. '{"ordinal": 2, "ordinalValue": "BBB"}'
        #[arg(long)]
        metadata: Option<String>,
    },

    /// List a user's facts, newest first
    List {
        #[arg(short, long)]
        user: String,

        /// Include superseded facts
        #[arg(long)]
        all: bool,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Mark a fact as superseded
    Supersede { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate {
            user,
            query,
            response,
            mode,
            db,
        } => commands::validate::run(&config, db.as_deref(), &user, &query, &response, mode).await?,
        Commands::Select { vault, query } => commands::select::run(&config, &vault, &query)?,
        Commands::Budget {
            memory,
            documents,
            vault,
        } => commands::budget::run(&config, memory.as_deref(), documents.as_deref(), vault.as_deref())?,
        Commands::Facts { action, db } => {
            let store = commands::open_sqlite(&config, db.as_deref()).await?;
            match action {
                FactsAction::Add {
                    user,
                    content,
                    category,
                    metadata,
                } => commands::facts::add(&store, &user, &content, &category, metadata.as_deref()).await?,
                FactsAction::List { user, all, limit } => commands::facts::list(&store, &user, all, limit).await?,
                FactsAction::Supersede { id } => commands::facts::supersede(&store, &id).await?,
            }
        }
    }

    Ok(())
}
