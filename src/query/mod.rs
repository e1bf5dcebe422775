//! Query decomposition and execution
//!
//! This module provides the engine that keeps analytics requests under the
//! server's size and time limits:
//! - Hierarchy expansion of symbolic dimensions
//! - Complexity scoring and chunk planning
//! - Batched execution with retry, re-planning and cancellation
//! - Reassembly into one result with a failure manifest

mod estimator;
mod executor;
mod expander;
mod hierarchy;
mod model;
mod planner;
mod result;
mod retry;
pub mod wire;

pub use estimator::{ComplexityEstimator, ComplexityScore};
pub use executor::{
    BatchExecutor, BatchReport, Progress, ProgressListener, QueryExecutor, Row, SubQueryFailure,
    SubQueryOutcome, TransportError,
};
pub use expander::{HierarchyExpander, HierarchyResolver, ResolverError};
pub use hierarchy::{HierarchyNode, StaticHierarchy};
pub use model::{Cardinality, Dimension, DimensionSpec, HierarchyRef, Query, QueryBuilder};
pub use planner::{ChunkPlanner, ExecutionPlan, PlannedQuery, PlannerSettings};
pub use result::{ExecutionStats, ManifestEntry, QueryResult, ResultAssembler};
pub use retry::{Classification, FailureKind, RetryController};

use crate::config::DecompositionConfig;
use crate::error::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// High-level engine: expand, plan, execute, assemble.
///
/// The engine holds no state between calls beyond its default configuration;
/// callers with different risk tolerances pass their own config to
/// [`DecompositionEngine::execute_with`].
#[derive(Clone)]
pub struct DecompositionEngine {
    executor: Arc<dyn QueryExecutor>,
    expander: HierarchyExpander,
    config: DecompositionConfig,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl DecompositionEngine {
    /// Create an engine with default configuration
    pub fn new(executor: Arc<dyn QueryExecutor>, resolver: Arc<dyn HierarchyResolver>) -> Self {
        Self::builder(executor).with_resolver(resolver).build()
    }

    pub fn builder(executor: Arc<dyn QueryExecutor>) -> EngineBuilder {
        EngineBuilder::new(executor)
    }

    pub fn config(&self) -> &DecompositionConfig {
        &self.config
    }

    /// Expand and plan `query` without executing anything.
    pub async fn plan(&self, query: &Query) -> Result<ExecutionPlan> {
        self.plan_with(query, &self.config).await
    }

    #[instrument(skip_all, fields(limit = config.safe_limit))]
    pub async fn plan_with(
        &self,
        query: &Query,
        config: &DecompositionConfig,
    ) -> Result<ExecutionPlan> {
        config.validate()?;
        let expanded = self.expander.expand_query(query).await?;
        ChunkPlanner::new(PlannerSettings::from_config(config)).plan(&expanded)
    }

    /// Execute `query` with the engine's configuration.
    pub async fn execute(&self, query: &Query) -> Result<QueryResult> {
        self.execute_with(query, &self.config, CancellationToken::new()).await
    }

    /// Execute `query` under `config`.
    ///
    /// Planning errors abort before any executor call. Execution failures end
    /// up in the manifest of the returned result unless `config.fail_fast` is
    /// set. Cancelling `cancel` returns the partial result gathered so far.
    #[instrument(skip_all, fields(limit = config.safe_limit, concurrency = config.concurrency))]
    pub async fn execute_with(
        &self,
        query: &Query,
        config: &DecompositionConfig,
        cancel: CancellationToken,
    ) -> Result<QueryResult> {
        let plan = self.plan_with(query, config).await?;

        let report = BatchExecutor::new(self.executor.clone(), config)
            .with_progress(self.progress.clone())
            .run(plan, &cancel)
            .await?;
        let result = ResultAssembler::new().assemble_report(report);

        info!(
            planned = result.stats.planned,
            succeeded = result.stats.succeeded,
            failed = result.manifest().len(),
            replans = result.stats.replans,
            rows = result.rows().len(),
            "query execution finished"
        );
        Ok(result)
    }
}

/// Builder for configuring and creating a [`DecompositionEngine`]
pub struct EngineBuilder {
    executor: Arc<dyn QueryExecutor>,
    resolver: Option<Arc<dyn HierarchyResolver>>,
    config: DecompositionConfig,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl EngineBuilder {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            executor,
            resolver: None,
            config: DecompositionConfig::default(),
            progress: None,
        }
    }

    /// Hierarchy source for symbolic dimensions. Without one, every descendant
    /// lookup fails as an unknown node.
    pub fn with_resolver(mut self, resolver: Arc<dyn HierarchyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_config(mut self, config: DecompositionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.progress = Some(listener);
        self
    }

    pub fn build(self) -> DecompositionEngine {
        let resolver: Arc<dyn HierarchyResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(StaticHierarchy::default()),
        };

        DecompositionEngine {
            executor: self.executor,
            expander: HierarchyExpander::new(resolver),
            config: self.config,
            progress: self.progress,
        }
    }
}
