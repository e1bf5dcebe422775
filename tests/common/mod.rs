//! Common test utilities: scripted executor and counting hierarchy resolver

#![allow(dead_code)]

use async_trait::async_trait;
use dimsplit_core::config::{DecompositionConfig, RetryPolicy};
use dimsplit_core::query::{
    HierarchyNode, HierarchyResolver, Progress, ProgressListener, Query, ResolverError, Row,
    StaticHierarchy, TransportError,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One row per (item, unit, period) combination, as a DHIS2 analytics
/// response would carry for a fully populated query.
pub fn rows_for(query: &Query) -> Vec<Row> {
    let ids = |spec: &dimsplit_core::DimensionSpec| {
        spec.ids().map(<[String]>::to_vec).unwrap_or_default()
    };
    let mut rows = Vec::new();
    for item in ids(query.items()) {
        for unit in ids(query.units()) {
            for period in ids(query.periods()) {
                rows.push(vec![item.clone(), unit.clone(), period.clone(), "1".to_string()]);
            }
        }
    }
    rows
}

/// Query executor with scripted failures.
///
/// Responses are taken from `script` first; once it is empty every call
/// succeeds unless one of the failure rules matches.
#[derive(Default)]
pub struct MockExecutor {
    script: Mutex<VecDeque<TransportError>>,
    /// Queries containing any of these units always fail with `unit_error`
    failing_units: HashSet<String>,
    unit_error: Option<TransportError>,
    /// From this call index on, queries with more units than the cap fail
    overload: Option<(usize, usize)>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub seen: Mutex<Vec<Query>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, errors: impl IntoIterator<Item = TransportError>) -> Self {
        *self.script.lock() = errors.into_iter().collect();
        self
    }

    pub fn failing_unit(mut self, unit: &str, error: TransportError) -> Self {
        self.failing_units.insert(unit.to_string());
        self.unit_error = Some(error);
        self
    }

    pub fn overloaded_after(mut self, call: usize, max_units: usize) -> Self {
        self.overload = Some((call, max_units));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self, call: usize, query: &Query) -> Result<Vec<Row>, TransportError> {
        if let Some(error) = self.script.lock().pop_front() {
            return Err(error);
        }

        let units = query.units().ids().unwrap_or_default();
        if let Some(error) = &self.unit_error {
            if units.iter().any(|u| self.failing_units.contains(u)) {
                return Err(error.clone());
            }
        }
        if let Some((from_call, max_units)) = self.overload {
            if call >= from_call && units.len() > max_units {
                return Err(TransportError::status(504, "Gateway Timeout"));
            }
        }
        Ok(rows_for(query))
    }
}

#[async_trait]
impl dimsplit_core::QueryExecutor for MockExecutor {
    async fn execute(&self, query: &Query) -> Result<Vec<Row>, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.seen.lock().push(query.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let response = self.respond(call, query);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

/// Hierarchy resolver that counts lookups.
pub struct CountingResolver {
    inner: StaticHierarchy,
    pub calls: AtomicUsize,
}

impl CountingResolver {
    pub fn new(inner: StaticHierarchy) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HierarchyResolver for CountingResolver {
    async fn descendants(
        &self,
        node: &str,
        levels: Option<&BTreeSet<u32>>,
    ) -> Result<Vec<String>, ResolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.descendants(node, levels).await
    }
}

/// `country` with `units` facilities at level 2, named `u0000`, `u0001`, ...
pub fn flat_hierarchy(units: usize) -> StaticHierarchy {
    let mut nodes = vec![HierarchyNode {
        id: "country".to_string(),
        parent: None,
        level: 1,
    }];
    nodes.extend((0..units).map(|u| HierarchyNode {
        id: unit_id(u),
        parent: Some("country".to_string()),
        level: 2,
    }));
    StaticHierarchy::new(nodes)
}

pub fn unit_id(index: usize) -> String {
    format!("u{:04}", index)
}

pub fn ids(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}{:02}", prefix, i)).collect()
}

/// Explicit query of the given shape.
pub fn explicit_query(items: usize, units: usize, periods: usize) -> Query {
    Query::builder()
        .items(ids("item", items))
        .units((0..units).map(unit_id))
        .periods(ids("2024", periods))
        .build()
}

/// Default config with millisecond backoff.
pub fn fast_config() -> DecompositionConfig {
    DecompositionConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 10,
        },
        ..Default::default()
    }
}

/// Cancels the token once `after` sub-queries have completed.
pub struct CancelAfter {
    pub token: CancellationToken,
    pub after: usize,
    pub seen: Mutex<Vec<Progress>>,
}

impl CancelAfter {
    pub fn new(token: CancellationToken, after: usize) -> Arc<Self> {
        Arc::new(Self {
            token,
            after,
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl ProgressListener for CancelAfter {
    fn on_progress(&self, progress: Progress) {
        self.seen.lock().push(progress);
        if progress.completed >= self.after {
            self.token.cancel();
        }
    }
}
