//! Command-line host for the clarion agent.
//!
//! Loads configuration, tool manifests and context, then runs requests from
//! the command line or an interactive stdin loop.
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        reason = "Allow for tests"
    )
)]

/// Command-line arguments.
pub mod cli;
/// Tracing subscriber setup.
pub mod logging;
/// Request handling and output.
pub mod session;

use anyhow::Result;
use clarion_core::AgentConfig;
use serde_json::Map;
use tokio::io::{AsyncBufReadExt as _, BufReader, stdin};
use tracing::info;

pub use cli::Cli;
pub use session::Session;

/// Configuration from `--config`, or the default file, with CLI overrides applied.
///
/// # Errors
/// Returns an error if the configuration cannot be read or is invalid
pub fn load_config(cli: &Cli) -> Result<AgentConfig> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::load_from_file(path)?,
        None => AgentConfig::load_or_create()?,
    };
    if let Some(max_steps) = cli.max_steps {
        config.execution.max_steps = max_steps;
    }
    config.validate()?;
    Ok(config)
}

/// Runs the host with parsed arguments.
///
/// # Errors
/// Returns an error if configuration, manifests or context cannot be loaded,
/// or if input and output fail
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    logging::init_logging(&config.logging, cli.log_stderr)?;
    info!("Starting clarion with {} manifests", cli.manifest.len());

    let registry = session::load_registry(&cli.manifest)?;
    let context = match &cli.context {
        Some(path) => session::load_context(path).await?,
        None => Map::new(),
    };

    let mut session = Session::new(&config, registry, context)?;
    let mut input = BufReader::new(stdin()).lines();
    match &cli.request {
        Some(request) => {
            session.handle_request(request, &mut input).await?;
        }
        None => session.run_interactive(&mut input).await?,
    }

    if let Some(path) = &cli.transcript {
        session.write_transcript(path).await?;
    }
    Ok(())
}
