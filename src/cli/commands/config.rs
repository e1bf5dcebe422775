use super::{LoggingArgs, OutputFormat};
use crate::config::ConfigArgs;
use clap::Args;

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output format (table prints TOML)
    #[arg(long, value_enum, default_value_t = OutputFormat::Toml)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub logging: LoggingArgs,
}
