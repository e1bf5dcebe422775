//! Configuration management for the decomposition engine.
//!
//! Configuration is resolved from several layers:
//! 1. Built-in defaults (embedded in the binary)
//! 2. A user-specified TOML file
//! 3. Environment variables (prefixed with `DIMSPLIT_`, nested keys joined by `__`)
//! 4. Command-line overrides
//!
//! Later layers override earlier ones. The resulting [`DecompositionConfig`] is a
//! plain value passed into each execute call; nothing here is process-global.
//!
//! # Environment Variables
//!
//! - `DIMSPLIT_SAFE_LIMIT` - complexity budget per sub-query
//! - `DIMSPLIT_CONCURRENCY` - concurrent sub-queries
//! - `DIMSPLIT_RETRY__MAX_ATTEMPTS` - attempts per sub-query
//! - `DIMSPLIT_URL__TRANSPORT` - `get` or `post`

use crate::constants;
use crate::error::{Error, Result};
use crate::query::Dimension;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Tuning for one execute call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    /// Maximum complexity score per sub-query
    pub safe_limit: u64,
    /// Optional per-dimension caps on identifiers per sub-query
    pub chunk_sizes: ChunkSizes,
    /// Request serialization settings for the URL-length check
    pub url: UrlConfig,
    /// Retry and backoff policy
    pub retry: RetryPolicy,
    /// Re-plans allowed after transient exhaustion
    pub max_replans: u32,
    /// Concurrent sub-queries in flight
    pub concurrency: usize,
    /// Abort on the first permanent failure instead of returning a partial result
    pub fail_fast: bool,
    /// Engine-side timeout per executor call, in milliseconds
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            safe_limit: constants::limits::SAFE_LIMIT,
            chunk_sizes: ChunkSizes::default(),
            url: UrlConfig::default(),
            retry: RetryPolicy::default(),
            max_replans: constants::retry::MAX_REPLANS,
            concurrency: constants::execution::CONCURRENCY,
            fail_fast: false,
            attempt_timeout_ms: None,
        }
    }
}

/// Per-dimension caps on identifiers carried by one sub-query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkSizes {
    pub items: Option<usize>,
    pub units: Option<usize>,
    pub periods: Option<usize>,
}

impl ChunkSizes {
    pub fn get(&self, dimension: Dimension) -> Option<usize> {
        match dimension {
            Dimension::Items => self.items,
            Dimension::Units => self.units,
            Dimension::Periods => self.periods,
        }
    }

    pub fn set(&mut self, dimension: Dimension, cap: Option<usize>) {
        match dimension {
            Dimension::Items => self.items = cap,
            Dimension::Units => self.units = cap,
            Dimension::Periods => self.periods = cap,
        }
    }

    /// Every cap halved, never below one.
    pub fn halved(&self) -> Self {
        let half = |cap: Option<usize>| cap.map(|c| (c / 2).max(1));
        Self {
            items: half(self.items),
            units: half(self.units),
            periods: half(self.periods),
        }
    }
}

/// How sub-queries travel to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Parameters in the query string; subject to the URL-length check
    Get,
    /// Parameters in the request body
    #[default]
    Post,
}

/// URL-length check settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlConfig {
    pub transport: Transport,
    /// Maximum full URL length in characters
    pub url_length_limit: usize,
    /// Length of scheme, host and path that precede the query string
    pub base_url_length: usize,
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            url_length_limit: constants::limits::URL_LENGTH_LIMIT,
            base_url_length: 0,
        }
    }
}

impl UrlConfig {
    /// Query-string budget when the GET check applies.
    pub fn query_budget(&self) -> Option<usize> {
        match self.transport {
            Transport::Get => Some(self.url_length_limit.saturating_sub(self.base_url_length)),
            Transport::Post => None,
        }
    }
}

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per sub-query, the first call included
    pub max_attempts: u32,
    /// Delay after the first failure, in milliseconds
    pub base_delay_ms: u64,
    /// Growth factor per failed attempt
    pub multiplier: f64,
    /// Cap on any single delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::retry::MAX_ATTEMPTS,
            base_delay_ms: constants::retry::BASE_DELAY_MS,
            multiplier: constants::retry::MULTIPLIER,
            max_delay_ms: constants::retry::MAX_DELAY_MS,
        }
    }
}

impl DecompositionConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(constants::config::ENV_PREFIX)
                .prefix_separator("_")
                .separator(constants::config::ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: DecompositionConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the planner or executor cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.safe_limit < 1 {
            return Err(Error::invalid_config("safe_limit must be at least 1"));
        }
        if self.concurrency < 1 {
            return Err(Error::invalid_config("concurrency must be at least 1"));
        }
        if self.retry.max_attempts < 1 {
            return Err(Error::invalid_config("retry.max_attempts must be at least 1"));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(Error::invalid_config(format!(
                "retry.multiplier must be a finite value >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        for dimension in Dimension::ALL {
            if self.chunk_sizes.get(dimension) == Some(0) {
                return Err(Error::invalid_config(format!(
                    "chunk_sizes.{} must be at least 1",
                    dimension
                )));
            }
        }
        if self.url.transport == Transport::Get && self.url.query_budget() == Some(0) {
            return Err(Error::invalid_config(
                "url.base_url_length leaves no room for query parameters",
            ));
        }
        if self.attempt_timeout_ms == Some(0) {
            return Err(Error::invalid_config("attempt_timeout_ms must be positive"));
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }
}

/// Command-line overrides shared by CLI commands
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Complexity budget per sub-query
    #[arg(long, value_name = "N")]
    pub safe_limit: Option<u64>,

    /// Concurrent sub-queries
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Request transport (get enables the URL-length check)
    #[arg(long, value_parser = parse_transport)]
    pub transport: Option<Transport>,

    /// Maximum URL length for GET requests
    #[arg(long, value_name = "CHARS")]
    pub url_length_limit: Option<usize>,

    /// Cap on item identifiers per sub-query
    #[arg(long, value_name = "N")]
    pub max_items: Option<usize>,

    /// Cap on unit identifiers per sub-query
    #[arg(long, value_name = "N")]
    pub max_units: Option<usize>,

    /// Cap on period identifiers per sub-query
    #[arg(long, value_name = "N")]
    pub max_periods: Option<usize>,
}

impl ConfigArgs {
    /// Load layered configuration and apply command-line overrides on top.
    pub fn resolve(&self) -> Result<DecompositionConfig> {
        let mut config = DecompositionConfig::load(self.config.as_deref())?;

        if let Some(limit) = self.safe_limit {
            config.safe_limit = limit;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(transport) = self.transport {
            config.url.transport = transport;
        }
        if let Some(limit) = self.url_length_limit {
            config.url.url_length_limit = limit;
        }
        for (dimension, cap) in [
            (Dimension::Items, self.max_items),
            (Dimension::Units, self.max_units),
            (Dimension::Periods, self.max_periods),
        ] {
            if cap.is_some() {
                config.chunk_sizes.set(dimension, cap);
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_transport(value: &str) -> std::result::Result<Transport, String> {
    match value.to_ascii_lowercase().as_str() {
        "get" => Ok(Transport::Get),
        "post" => Ok(Transport::Post),
        other => Err(format!("unknown transport '{}', expected get or post", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = DecompositionConfig::load(None).unwrap();
        assert_eq!(config, DecompositionConfig::default());
        assert_eq!(config.safe_limit, 10_000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.url.transport, Transport::Post);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "safe_limit = 500\n[chunk_sizes]\nunits = 50\n[retry]\nmax_attempts = 5"
        )
        .unwrap();

        let config = DecompositionConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.safe_limit, 500);
        assert_eq!(config.chunk_sizes.units, Some(50));
        assert_eq!(config.chunk_sizes.items, None);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 500);
    }

    #[test]
    fn test_config_file_with_invalid_limit_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "safe_limit = 0").unwrap();

        let err = DecompositionConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DecompositionConfig::default();
        config.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = DecompositionConfig::default();
        config.retry.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = DecompositionConfig::default();
        config.chunk_sizes.periods = Some(0);
        assert!(config.validate().is_err());

        let mut config = DecompositionConfig::default();
        config.url.transport = Transport::Get;
        config.url.base_url_length = config.url.url_length_limit;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_sizes_halve_to_at_least_one() {
        let sizes = ChunkSizes {
            items: Some(1),
            units: Some(50),
            periods: None,
        };
        let halved = sizes.halved();
        assert_eq!(halved.items, Some(1));
        assert_eq!(halved.units, Some(25));
        assert_eq!(halved.periods, None);
    }

    #[test]
    fn test_args_override_file() {
        let args = ConfigArgs {
            safe_limit: Some(42),
            transport: Some(Transport::Get),
            max_units: Some(10),
            ..Default::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.safe_limit, 42);
        assert_eq!(config.url.transport, Transport::Get);
        assert_eq!(config.chunk_sizes.units, Some(10));
    }

    #[test]
    fn test_parse_transport() {
        assert_eq!(parse_transport("GET").unwrap(), Transport::Get);
        assert!(parse_transport("websocket").is_err());
    }
}
