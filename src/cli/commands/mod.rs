//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod analyze;
mod classify;
mod report;
mod runs;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "clauseguard")]
#[command(about = "Contract clause risk analysis")]
#[command(version)]
pub struct Cli {
    /// Data directory holding results, uploads and the run ledger
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Output format for stored reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Styled terminal output
    #[default]
    Text,
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Address to bind to: PORT, HOST, or HOST:PORT (default from config, 127.0.0.1:3030)
        bind: Option<String>,
    },

    /// Analyze a contract (PDF or plain text) and store its risk report
    Analyze {
        /// Contract file
        file: PathBuf,
        /// Print the outcome as JSON instead of a styled report
        #[arg(long)]
        json: bool,
        /// Concurrent categorization requests (default from config)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
    },

    /// Show a stored report (latest by default)
    Report {
        /// Result version to show
        #[arg(long)]
        version: Option<u64>,
        /// Show the per-clause aggregate instead of the tiered report
        #[arg(long)]
        aggregate: bool,
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: ReportFormat,
    },

    /// Show the clause keys and their risk tiers
    Classify {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recent analysis runs
    Runs {
        /// Number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Check that pdftotext and the LLM endpoint are reachable
    Check,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        data: cli.data,
    };
    let (settings, config) = load_settings_with_options(options).await;
    tracing::debug!("Data directory: {}", settings.data_dir.display());

    match cli.command {
        Commands::Serve { bind } => serve::cmd_serve(&settings, &config, bind.as_deref()).await,
        Commands::Analyze {
            file,
            json,
            concurrency,
        } => analyze::cmd_analyze(&settings, &config, &file, json, concurrency).await,
        Commands::Report {
            version,
            aggregate,
            format,
        } => report::cmd_report(&settings, version, aggregate, format).await,
        Commands::Classify { json } => classify::cmd_classify(&settings, &config, json).await,
        Commands::Runs { limit } => runs::cmd_runs(&settings, limit).await,
        Commands::Check => analyze::cmd_check(&config).await,
    }
}
