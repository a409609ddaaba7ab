//! codeseek - semantic search over the functions of a source tree
//!
//! Splits source files into function-level chunks, embeds them and answers
//! natural-language queries with the closest matches.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod core;
mod embed;
mod index;
mod store;

use cli::search::OutputFormat;

/// codeseek - find functions by what they do
#[derive(Parser)]
#[command(name = "codeseek")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Semantic search over the functions of a source tree", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a directory and search it interactively
    Run {
        /// Directory to index (defaults to current directory)
        path: Option<String>,

        /// Collection name
        #[arg(short = 'n', long)]
        collection: Option<String>,

        /// Results per query
        #[arg(short = 'k', long)]
        limit: Option<usize>,

        /// Print results as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Index a directory into the configured store
    Index {
        /// Directory to index
        path: String,

        /// Collection name
        #[arg(short = 'n', long)]
        collection: Option<String>,
    },

    /// Search a previously indexed collection
    Search {
        /// Collection name
        #[arg(short = 'n', long)]
        collection: Option<String>,

        /// Results per query
        #[arg(short = 'k', long)]
        limit: Option<usize>,

        /// Run a single query instead of the interactive loop
        #[arg(short, long)]
        query: Option<String>,

        /// Print results as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize configuration file
        #[arg(long)]
        init: bool,
    },

    /// Show version and system info
    Info,
}

fn output_format(json: bool) -> OutputFormat {
    if json {
        OutputFormat::Json
    } else {
        OutputFormat::Pretty
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;
    config.verbose = cli.verbose;

    debug!("codeseek v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Run {
            path,
            collection,
            limit,
            json,
        }) => {
            let path = path.unwrap_or_else(|| ".".to_string());
            cli::run::run(config, &path, collection.as_deref(), limit, output_format(json)).await?;
        }
        Some(Commands::Index { path, collection }) => {
            cli::index::run(config, &path, collection.as_deref()).await?;
        }
        Some(Commands::Search {
            collection,
            limit,
            query,
            json,
        }) => {
            cli::search::run(
                config,
                collection.as_deref(),
                limit,
                query.as_deref(),
                output_format(json),
            )
            .await?;
        }
        Some(Commands::Config { show, init }) => {
            if init {
                config::init_config(cli.config.as_deref())?;
            } else if show {
                config::show_config(&config)?;
            }
        }
        Some(Commands::Info) => {
            cli::info::run(&config).await?;
        }
        None => {
            // Default: index the current directory and start searching
            cli::run::run(config, ".", None, None, OutputFormat::Pretty).await?;
        }
    }

    Ok(())
}
