use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for the clarion host
#[derive(Debug, Parser)]
#[command(name = "clarion")]
#[command(about = "Tool-calling agent that asks before it guesses", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ~/.clarion/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Tool manifest to load; may be repeated
    #[arg(long)]
    pub manifest: Vec<PathBuf>,

    /// JSON object offered to plugins as context
    #[arg(long, value_name = "JSON_FILE")]
    pub context: Option<PathBuf>,

    /// Run a single request instead of the interactive loop
    #[arg(long)]
    pub request: Option<String>,

    /// Write the conversation as JSON when done
    #[arg(long)]
    pub transcript: Option<PathBuf>,

    /// Override the per-request step limit
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Log to stderr instead of the log file
    #[arg(long)]
    pub log_stderr: bool,
}
