pub mod config;
pub mod plan;

pub use config::ConfigCommand;
pub use plan::PlanCommand;

use clap::{Args, Subcommand, ValueEnum};

#[derive(Subcommand)]
pub enum Commands {
    /// Expand and split a query without executing it
    Plan(PlanCommand),
    /// Print the effective configuration
    Config(ConfigCommand),
}

impl Commands {
    pub fn logging(&self) -> &LoggingArgs {
        match self {
            Commands::Plan(cmd) => &cmd.logging,
            Commands::Config(cmd) => &cmd.logging,
        }
    }
}

/// Logging flags shared by every command
#[derive(Debug, Clone, Default, Args)]
pub struct LoggingArgs {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Tracing filter directive, overrides RUST_LOG
    #[arg(long = "log-filter", value_name = "FILTER")]
    pub log_filter: Option<String>,
}

impl LoggingArgs {
    pub fn get_effective_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Output encoding for command results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Toml,
}
