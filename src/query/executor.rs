//! Batched execution of planned sub-queries with retry, re-planning and
//! cancellation.

use super::model::Query;
use super::planner::{ChunkPlanner, ExecutionPlan, PlannedQuery, PlannerSettings};
use super::retry::{FailureKind, RetryController};
use crate::config::DecompositionConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// One result row as returned by the analytics API.
pub type Row = Vec<String>;

/// Failure reported by a [`QueryExecutor`] for a single request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete in time
    #[error("Request timed out")]
    Timeout,

    /// The server answered with a non-success status
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    /// Connection could not be established or was dropped
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The sub-query could not be serialized into a request
    #[error("Malformed request: {0}")]
    Malformed(String),

    /// Anything else
    #[error("Transport error: {0}")]
    Other(String),
}

/// HTTP statuses that signal an overloaded or briefly unavailable server.
const TRANSIENT_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

impl TransportError {
    pub fn status<S: Into<String>>(code: u16, message: S) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Check if the failure is worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) => true,
            Self::Status { code, .. } => TRANSIENT_STATUSES.contains(code),
            Self::Malformed(_) | Self::Other(_) => false,
        }
    }
}

/// Issues one bounded sub-query against the analytics back-end.
///
/// Implementations own the wire format (query string, POST body, ...) and
/// must surface timeouts and HTTP statuses as [`TransportError`] so they can
/// be classified.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &Query) -> std::result::Result<Vec<Row>, TransportError>;
}

/// Why a sub-query produced no rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubQueryFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SubQueryFailure {
    fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: "cancelled before completion".to_string(),
        }
    }
}

/// Final outcome of one planned sub-query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQueryOutcome {
    pub sequence: usize,
    pub query: Query,
    pub result: std::result::Result<Vec<Row>, SubQueryFailure>,
    /// Executor calls made; zero for sub-queries never dispatched
    pub attempts: u32,
}

impl SubQueryOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    fn cancelled(planned: PlannedQuery, attempts: u32) -> Self {
        Self {
            sequence: planned.sequence,
            query: planned.query,
            result: Err(SubQueryFailure::cancelled()),
            attempts,
        }
    }
}

/// Emitted once per completed sub-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Sub-queries with a final outcome so far
    pub completed: usize,
    /// Current plan size (changes after a re-plan)
    pub total: usize,
    /// Sequence of the sub-query that just completed
    pub sequence: usize,
    pub succeeded: bool,
}

/// Caller-side hook for progress reporting.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, progress: Progress);
}

/// Everything the batch run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// One outcome per final planned sub-query, in plan order
    pub outcomes: Vec<SubQueryOutcome>,
    /// Re-plans performed
    pub replans: u32,
    /// Complexity limit in force when the run ended
    pub final_limit: u64,
}

/// Drives an [`ExecutionPlan`] through a [`QueryExecutor`].
///
/// Sub-queries run on a bounded pool of in-task futures. The run loop is the
/// only writer of the pending queue and the outcome list; workers hand their
/// outcome back through the pool and never touch shared state.
///
/// Every planned sub-query ends with exactly one outcome. A sub-query that is
/// re-planned is replaced by its pieces, and each piece gets its own outcome.
pub struct BatchExecutor {
    executor: Arc<dyn QueryExecutor>,
    retry: RetryController,
    settings: PlannerSettings,
    concurrency: usize,
    max_replans: u32,
    fail_fast: bool,
    attempt_timeout: Option<Duration>,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl BatchExecutor {
    pub fn new(executor: Arc<dyn QueryExecutor>, config: &DecompositionConfig) -> Self {
        Self {
            executor,
            retry: RetryController::new(config.retry.clone()),
            settings: PlannerSettings::from_config(config),
            concurrency: config.concurrency.max(1),
            max_replans: config.max_replans,
            fail_fast: config.fail_fast,
            attempt_timeout: config.attempt_timeout(),
            progress: None,
        }
    }

    /// Planner settings used when the remaining plan has to be rebuilt.
    pub fn with_planner_settings(mut self, settings: PlannerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_progress(mut self, listener: Option<Arc<dyn ProgressListener>>) -> Self {
        self.progress = listener;
        self
    }

    /// Run every sub-query of `plan`.
    ///
    /// Cancelling `cancel` stops dispatch at once; in-flight sub-queries are
    /// awaited and everything not yet dispatched is recorded as cancelled.
    /// Only fail-fast mode turns a permanent failure into an `Err`.
    #[instrument(skip_all, fields(sub_queries = plan.len(), concurrency = self.concurrency))]
    pub async fn run(
        &self,
        plan: ExecutionPlan,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let mut settings = self.settings.clone();
        let mut pending: VecDeque<PlannedQuery> = plan.into_sub_queries().into();
        let mut next_sequence = pending.iter().map(|p| p.sequence + 1).max().unwrap_or(0);
        let mut outcomes: Vec<SubQueryOutcome> = Vec::with_capacity(pending.len());
        let mut in_flight = FuturesUnordered::new();
        let mut replans = 0u32;
        let mut halted: Option<Error> = None;

        loop {
            while in_flight.len() < self.concurrency && halted.is_none() && !cancel.is_cancelled() {
                match pending.pop_front() {
                    Some(planned) => in_flight.push(self.run_one(planned, cancel.clone())),
                    None => break,
                }
            }

            let Some(finished) = in_flight.next().await else {
                break;
            };
            let (planned, outcome) = finished;

            if let Err(failure) = &outcome.result {
                let replannable = failure.kind == FailureKind::Transient
                    && replans < self.max_replans
                    && halted.is_none()
                    && !cancel.is_cancelled();

                if replannable {
                    let halved = settings.halved();
                    let planner = ChunkPlanner::new(halved.clone());
                    let pieces = planner.plan_from(&planned.query, next_sequence)?;

                    // an unsplittable sub-query keeps its exhausted outcome
                    if pieces.len() > 1 {
                        replans += 1;
                        settings = halved;
                        next_sequence += pieces.len();

                        let mut rebuilt: VecDeque<PlannedQuery> = pieces.into();
                        for suffix in pending.drain(..) {
                            let pieces = planner.plan_from(&suffix.query, next_sequence)?;
                            next_sequence += pieces.len();
                            rebuilt.extend(pieces);
                        }

                        warn!(
                            replan = replans,
                            limit = settings.limit,
                            remaining = rebuilt.len(),
                            error = %failure.message,
                            "re-planning remaining sub-queries with a smaller limit"
                        );
                        pending = rebuilt;
                        continue;
                    }

                    debug!(
                        sequence = outcome.sequence,
                        limit = halved.limit,
                        "sub-query does not split under a halved limit, keeping failure"
                    );
                }

                if self.fail_fast && failure.kind != FailureKind::Cancelled && halted.is_none() {
                    warn!(
                        sequence = outcome.sequence,
                        kind = %failure.kind,
                        "fail-fast: stopping dispatch"
                    );
                    halted = Some(Error::FailFast {
                        sequence: outcome.sequence,
                        kind: failure.kind,
                        attempts: outcome.attempts,
                        message: failure.message.clone(),
                    });
                }
            }

            let sequence = outcome.sequence;
            let succeeded = outcome.is_success();
            outcomes.push(outcome);
            self.report_progress(Progress {
                completed: outcomes.len(),
                total: outcomes.len() + in_flight.len() + pending.len(),
                sequence,
                succeeded,
            });
        }

        if let Some(err) = halted {
            return Err(err);
        }

        if !pending.is_empty() {
            info!(
                remaining = pending.len(),
                "execution cancelled, skipping remaining sub-queries"
            );
            outcomes.extend(
                pending
                    .drain(..)
                    .map(|planned| SubQueryOutcome::cancelled(planned, 0)),
            );
        }

        outcomes.sort_by_key(|o| o.sequence);
        Ok(BatchReport {
            outcomes,
            replans,
            final_limit: settings.limit,
        })
    }

    /// Execute one sub-query with retries. Returns the planned query alongside
    /// the outcome so the run loop can re-plan it.
    async fn run_one(
        &self,
        planned: PlannedQuery,
        cancel: CancellationToken,
    ) -> (PlannedQuery, SubQueryOutcome) {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let error = match self.call(&planned.query).await {
                Ok(rows) => {
                    debug!(
                        sequence = planned.sequence,
                        attempts,
                        rows = rows.len(),
                        "sub-query succeeded"
                    );
                    let outcome = SubQueryOutcome {
                        sequence: planned.sequence,
                        query: planned.query.clone(),
                        result: Ok(rows),
                        attempts,
                    };
                    return (planned, outcome);
                }
                Err(error) => error,
            };

            let classification = self.retry.classify(&error);
            if !self.retry.should_retry(classification, attempts) {
                warn!(
                    sequence = planned.sequence,
                    attempts,
                    error = %error,
                    ?classification,
                    "sub-query failed permanently"
                );
                let outcome = SubQueryOutcome {
                    sequence: planned.sequence,
                    query: planned.query.clone(),
                    result: Err(SubQueryFailure {
                        kind: classification.into(),
                        message: error.to_string(),
                    }),
                    attempts,
                };
                return (planned, outcome);
            }

            let delay = self.retry.next_delay(attempts);
            warn!(
                sequence = planned.sequence,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "sub-query failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    let outcome = SubQueryOutcome::cancelled(planned.clone(), attempts);
                    return (planned, outcome);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn call(&self, query: &Query) -> std::result::Result<Vec<Row>, TransportError> {
        match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.executor.execute(query))
                .await
                .unwrap_or(Err(TransportError::Timeout)),
            None => self.executor.execute(query).await,
        }
    }

    fn report_progress(&self, progress: Progress) {
        info!(
            "sub-query {} of {} completed (#{}, {})",
            progress.completed,
            progress.total,
            progress.sequence,
            if progress.succeeded { "ok" } else { "failed" }
        );
        if let Some(listener) = &self.progress {
            listener.on_progress(progress);
        }
    }
}
