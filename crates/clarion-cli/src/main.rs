//! Clarion CLI - asks before it guesses
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Allow for tests"
    )
)]

use anyhow::Result;
use clap::Parser as _;
use clarion_cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    clarion_cli::run(cli).await
}
