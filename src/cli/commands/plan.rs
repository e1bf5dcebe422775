use super::{LoggingArgs, OutputFormat};
use crate::config::ConfigArgs;
use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct PlanCommand {
    /// Data item identifiers (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "IDS")]
    pub items: Vec<String>,

    /// Explicit organisation unit identifiers (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "IDS", conflicts_with = "unit_parent")]
    pub units: Vec<String>,

    /// Hierarchy node(s) to take units from (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "IDS")]
    pub unit_parent: Vec<String>,

    /// Replace --unit-parent nodes with their descendants
    #[arg(long, requires = "unit_parent")]
    pub descendants: bool,

    /// Keep only descendants at these hierarchy levels
    #[arg(long, value_delimiter = ',', value_name = "LEVELS", requires = "descendants")]
    pub levels: Vec<u32>,

    /// Period identifiers (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "IDS")]
    pub periods: Vec<String>,

    /// Aggregation flag, as NAME or NAME=true|false (repeatable)
    #[arg(long = "flag", value_name = "NAME[=BOOL]", value_parser = parse_flag)]
    pub flags: Vec<(String, bool)>,

    /// JSON hierarchy file: {"nodes": [{"id", "parent", "level"}]}
    #[arg(long, value_name = "FILE")]
    pub hierarchy: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

fn parse_flag(value: &str) -> Result<(String, bool), String> {
    let (name, enabled) = match value.split_once('=') {
        Some((name, raw)) => {
            let enabled = raw
                .parse::<bool>()
                .map_err(|_| format!("flag '{}' expects true or false, got '{}'", name, raw))?;
            (name, enabled)
        }
        None => (value, true),
    };
    if name.is_empty() {
        return Err("flag name must not be empty".to_string());
    }
    Ok((name.to_string(), enabled))
}
