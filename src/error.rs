//! Error types for the decomposition engine.
//!
//! Planning-stage errors abort an `execute` call before any sub-query is
//! dispatched. Execution-stage failures are recorded per sub-query in the
//! result manifest and only surface here when fail-fast mode is requested.

use crate::query::{Dimension, FailureKind, ResolverError};
use std::result;
use thiserror::Error;

/// A specialized Result type for dimsplit operations.
pub type Result<T> = result::Result<T, Error>;

/// The error type for dimsplit operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad limit, threshold or policy value supplied by the caller
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A symbolic dimension reached a stage that needs explicit identifiers
    #[error("Dimension '{0}' is still symbolic and cannot be scored")]
    UnresolvedDimension(Dimension),

    /// The hierarchy resolver failed, so the query cannot be sized safely
    #[error("Hierarchy resolution failed for node '{node}': {source}")]
    HierarchyResolution {
        node: String,
        #[source]
        source: ResolverError,
    },

    /// First permanent sub-query failure while running in fail-fast mode
    #[error(
        "Sub-query #{sequence} failed permanently ({kind}) after {attempts} attempt(s): {message}"
    )]
    FailFast {
        sequence: usize,
        kind: FailureKind,
        attempts: u32,
        message: String,
    },

    /// Configuration source could not be read or deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Whether the error was raised before any network traffic took place.
    pub fn is_planning_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_)
                | Self::UnresolvedDimension(_)
                | Self::HierarchyResolution { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planning_errors_are_flagged() {
        assert!(Error::invalid_config("limit must be >= 1").is_planning_error());
        assert!(Error::UnresolvedDimension(Dimension::Units).is_planning_error());

        let err = Error::FailFast {
            sequence: 3,
            kind: FailureKind::Fatal,
            attempts: 1,
            message: "HTTP 401".into(),
        };
        assert!(!err.is_planning_error());
    }

    #[test]
    fn test_display_names_dimension() {
        let err = Error::UnresolvedDimension(Dimension::Units);
        assert_eq!(err.to_string(), "Dimension 'units' is still symbolic and cannot be scored");
    }
}
