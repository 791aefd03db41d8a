//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod config_cmd;
mod extract;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "doctext")]
#[command(about = "Adaptive document text extraction with parallel OCR fallback")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

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

#[derive(Subcommand)]
enum Commands {
    /// Extract text from a document, running OCR when the embedded text is unusable
    Extract {
        /// Document to extract
        file: PathBuf,
        /// Page count (derived from the document if omitted)
        #[arg(short, long)]
        pages: Option<u32>,
        /// Print text, OCR flag and metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the external extraction and OCR tools are installed
    Check,

    /// Print the effective configuration as TOML
    Config,
}

async fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::load_from_path(path)
                .await
                .map_err(|e| anyhow::anyhow!(e))
        }
        None => Ok(Config::load().await),
    }
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Extract { file, pages, json } => {
            extract::cmd_extract(&config, &file, pages, json).await
        }
        Commands::Check => check::cmd_check(&config).await,
        Commands::Config => config_cmd::cmd_config_show(&config).await,
    }
}
