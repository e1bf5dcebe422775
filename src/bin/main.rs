//! dimsplit binary.
//!
//! Command-line front end for planning decomposed analytics queries and
//! inspecting the effective configuration.

use anyhow::Result;
use clap::Parser;
use dimsplit_core::cli::{
    commands::Commands,
    handlers::{handle_config, handle_plan},
};
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging = cli.command.logging();
    let level: Level = logging.get_effective_level().parse().unwrap_or(Level::WARN);
    let builder = EnvFilter::builder().with_default_directive(level.into());
    let filter = match &logging.log_filter {
        Some(directives) => builder.parse_lossy(directives),
        None => builder.from_env_lossy(),
    };

    // stdout carries the command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    debug!("dimsplit starting up");

    match cli.command {
        Commands::Plan(cmd) => handle_plan(cmd).await?,
        Commands::Config(cmd) => handle_config(cmd).await?,
    }

    Ok(())
}
