//! Failure classification and exponential backoff.

use super::executor::TransportError;
use crate::config::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Final failure kind recorded for a sub-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeout / gateway-class failure that survived every retry and re-plan
    Transient,
    /// Malformed or unauthorized request; never retried
    Fatal,
    /// Not dispatched (or abandoned during backoff) because the caller cancelled
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Transient => "transient transport failure",
            FailureKind::Fatal => "fatal transport failure",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Transient,
    Fatal,
}

impl From<Classification> for FailureKind {
    fn from(classification: Classification) -> Self {
        match classification {
            Classification::Transient => FailureKind::Transient,
            Classification::Fatal => FailureKind::Fatal,
        }
    }
}

/// Classifies executor failures and computes backoff delays.
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn classify(&self, failure: &TransportError) -> Classification {
        if failure.is_retryable() {
            Classification::Transient
        } else {
            Classification::Fatal
        }
    }

    /// Delay to sleep after the `attempt`-th failed attempt (1-based):
    /// `min(max_delay, base_delay * multiplier^(attempt - 1))`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.policy.multiplier.powi(exponent);
        let millis =
            (self.policy.base_delay_ms as f64 * factor).min(self.policy.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }

    /// Whether another attempt should follow the `attempt`-th failure.
    pub fn should_retry(&self, classification: Classification, attempt: u32) -> bool {
        classification == Classification::Transient && attempt < self.policy.max_attempts
    }
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
