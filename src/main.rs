//! # cli-mate CLI (`wtf`)
//!
//! Wraps a command, and when it fails, explains why.
//!
//! ## Usage
//!
//! ```bash
//! wtf --config ./config/wtf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wtf run -- <cmd...>` | Run a command; analyze and store the failure if it fails |
//! | `wtf init` | Create the SQLite database and run schema migrations |
//! | `wtf list` | List stored cases, newest first |
//! | `wtf show <id>` | Print one stored case |
//! | `wtf similar "<text>"` | Query the similarity index directly |
//! | `wtf serve` | Start the HTTP API |
//!
//! When the config file does not exist, a minimal configuration is used:
//! database under `./data`, embeddings and analysis disabled.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use cli_mate::config::{self, Config};
use cli_mate::store::DEFAULT_PAGE_LIMIT;
use cli_mate::{capture, cases, migrate, server};

/// wtf: run a command, and when it fails, find out why.
#[derive(Parser)]
#[command(
    name = "wtf",
    about = "Run a command and get a root-cause analysis when it fails",
    version,
    long_about = "wtf captures a failing command's error output, locates the source line its \
    trace points at, retrieves similar past failures, and stores an AI-assisted root-cause \
    analysis that can be browsed from the CLI or over HTTP."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/wtf.toml`. A missing file falls back to a
    /// minimal built-in configuration. See `config/wtf.example.toml`.
    #[arg(long, global = true, default_value = "./config/wtf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command and analyze it if it fails.
    ///
    /// Stdout streams live; stderr is shown once the command exits. wtf
    /// always exits with the command's own exit code.
    Run {
        /// The command and its arguments, after `--`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// List stored cases, newest first.
    List {
        /// Only cases carrying this exact tag.
        #[arg(long)]
        tag: Option<String>,

        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: i64,

        /// Cases per page.
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: i64,
    },

    /// Print a stored case by id.
    Show {
        /// Case id.
        id: String,
    },

    /// Find stored cases similar to the given text.
    ///
    /// Requires an embedding provider to be configured.
    Similar {
        /// Error text to compare against.
        text: String,

        /// Minimum similarity in [0, 1]. Defaults to `retrieval.similarity_threshold`.
        #[arg(long)]
        threshold: Option<f64>,

        /// Maximum matches. Defaults to `retrieval.max_similar_cases`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using minimal config");
        Ok(Config::minimal())
    }
}

/// Logs go to stderr so a wrapped command's stdout stays clean.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(match cli.command {
        Commands::Serve => "info",
        _ => "warn",
    });

    // `run` executes the command even when the config is unusable.
    let loaded = load_or_minimal(&cli.config);

    match cli.command {
        Commands::Run { command } => {
            let code = capture::run_capture(loaded, &command).await?;
            std::process::exit(code);
        }
        Commands::Init => {
            migrate::run_migrations(&loaded?).await?;
            println!("Database initialized successfully.");
        }
        Commands::List { tag, page, limit } => {
            cases::run_list(&loaded?, tag.as_deref(), page, limit).await?;
        }
        Commands::Show { id } => {
            cases::run_show(&loaded?, &id).await?;
        }
        Commands::Similar {
            text,
            threshold,
            limit,
        } => {
            cases::run_similar(&loaded?, &text, threshold, limit).await?;
        }
        Commands::Serve => {
            server::run_server(&loaded?).await?;
        }
    }

    Ok(())
}
