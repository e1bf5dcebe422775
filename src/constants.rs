//! Shared constants for the dimsplit engine
//!
//! Centralizes default thresholds so the config layer, the planner and the
//! CLI agree on the same numbers.

/// Complexity and request-size thresholds
pub mod limits {
    /// Maximum product of per-dimension cardinalities for a single request
    pub const SAFE_LIMIT: u64 = 10_000;

    /// Maximum length of a GET request URL before proxies start rejecting it
    pub const URL_LENGTH_LIMIT: usize = 1_900;
}

/// Retry and backoff defaults
pub mod retry {
    /// Attempts per sub-query, the first call included
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Delay slept after the first failed attempt (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    /// Growth factor applied to the delay after every failed attempt
    pub const MULTIPLIER: f64 = 2.0;

    /// Upper bound on a single backoff delay (milliseconds)
    pub const MAX_DELAY_MS: u64 = 30_000;

    /// Re-plans allowed per execute call after transient exhaustion
    pub const MAX_REPLANS: u32 = 2;
}

/// Execution defaults
pub mod execution {
    /// Concurrent sub-queries; most analytics servers are the bottleneck
    pub const CONCURRENCY: usize = 1;
}

/// Configuration sources
pub mod config {
    /// Environment variable prefix (`DIMSPLIT_SAFE_LIMIT`, `DIMSPLIT_RETRY__MAX_ATTEMPTS`, ...)
    pub const ENV_PREFIX: &str = "DIMSPLIT";

    /// Separator for nested keys in environment variables
    pub const ENV_SEPARATOR: &str = "__";
}
