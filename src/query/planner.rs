//! Splitting of expanded queries into sub-queries that each satisfy the
//! complexity limit, the per-dimension caps and the URL budget.

use super::estimator::{ComplexityEstimator, ComplexityScore};
use super::model::{Dimension, Query};
use super::wire;
use crate::config::{ChunkSizes, DecompositionConfig};
use crate::error::{Error, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

/// A sub-query tagged with its position in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedQuery {
    /// Position used for ordering and logging
    pub sequence: usize,
    /// The sub-query itself
    pub query: Query,
    /// Score of the sub-query
    pub score: ComplexityScore,
}

/// Ordered sequence of sub-queries whose dimension values partition the
/// original query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ExecutionPlan {
    /// Complexity budget the plan was built for
    pub limit: u64,
    /// Score of the query before splitting
    pub original_score: Option<ComplexityScore>,
    sub_queries: Vec<PlannedQuery>,
}

impl ExecutionPlan {
    pub fn sub_queries(&self) -> &[PlannedQuery] {
        &self.sub_queries
    }

    pub fn into_sub_queries(self) -> Vec<PlannedQuery> {
        self.sub_queries
    }

    pub fn len(&self) -> usize {
        self.sub_queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_queries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlannedQuery> {
        self.sub_queries.iter()
    }

    /// Whether the query went out unsplit.
    pub fn is_single(&self) -> bool {
        self.sub_queries.len() == 1
    }
}

/// Thresholds the planner splits against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerSettings {
    /// Maximum score per sub-query
    pub limit: u64,
    /// Optional per-dimension identifier caps
    pub chunk_sizes: ChunkSizes,
    /// Query-string budget when sub-queries travel as GET requests
    pub url_budget: Option<usize>,
}

impl PlannerSettings {
    pub fn with_limit(limit: u64) -> Self {
        Self {
            limit,
            chunk_sizes: ChunkSizes::default(),
            url_budget: None,
        }
    }

    pub fn from_config(config: &DecompositionConfig) -> Self {
        Self {
            limit: config.safe_limit,
            chunk_sizes: config.chunk_sizes,
            url_budget: config.url.query_budget(),
        }
    }

    /// Settings for a re-plan after repeated server errors: limit and caps
    /// halved, never below one.
    pub fn halved(&self) -> Self {
        Self {
            limit: (self.limit / 2).max(1),
            chunk_sizes: self.chunk_sizes.halved(),
            url_budget: self.url_budget,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit < 1 {
            return Err(Error::invalid_config(format!(
                "complexity limit must be at least 1, got {}",
                self.limit
            )));
        }
        for dimension in Dimension::ALL {
            if self.chunk_sizes.get(dimension) == Some(0) {
                return Err(Error::invalid_config(format!(
                    "chunk size for {} must be at least 1",
                    dimension
                )));
            }
        }
        Ok(())
    }
}

/// Splits over-budget queries along their dominant dimension.
///
/// Rules, applied to every pending sub-query until none fires:
/// 1. score above the limit: split the largest dimension (ties: units,
///    periods, items) into chunks of `max(1, limit / product_of_others)`;
/// 2. a dimension above its chunk cap: split it into cap-sized chunks;
/// 3. GET query string above the URL budget: halve the dimension with the
///    longest encoded identifier list.
///
/// Chunks are contiguous and keep the original identifier order, and pending
/// work is a LIFO stack, so emitted sub-queries concatenate back to the input.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    estimator: ComplexityEstimator,
    settings: PlannerSettings,
}

impl ChunkPlanner {
    pub fn new(settings: PlannerSettings) -> Self {
        Self {
            estimator: ComplexityEstimator::new(),
            settings,
        }
    }

    pub fn with_limit(limit: u64) -> Self {
        Self::new(PlannerSettings::with_limit(limit))
    }

    /// Build a plan numbered from zero.
    pub fn plan(&self, query: &Query) -> Result<ExecutionPlan> {
        self.settings.validate()?;
        let original_score = self.estimator.score(query)?;
        let sub_queries = self.plan_from(query, 0)?;

        info!(
            score = %original_score,
            limit = self.settings.limit,
            sub_queries = sub_queries.len(),
            "built execution plan"
        );

        Ok(ExecutionPlan {
            limit: self.settings.limit,
            original_score: Some(original_score),
            sub_queries,
        })
    }

    /// Plan `query`, numbering sub-queries from `first_sequence`.
    pub fn plan_from(&self, query: &Query, first_sequence: usize) -> Result<Vec<PlannedQuery>> {
        self.decompose(query)?
            .into_iter()
            .enumerate()
            .map(|(offset, query)| {
                let score = self.estimator.score(&query)?;
                Ok(PlannedQuery {
                    sequence: first_sequence + offset,
                    query,
                    score,
                })
            })
            .collect()
    }

    /// Split `query` into sub-queries that each satisfy every rule.
    pub fn decompose(&self, query: &Query) -> Result<Vec<Query>> {
        self.settings.validate()?;

        let score = self.estimator.score(query)?;
        if score.is_empty() {
            debug!(score = %score, "empty selection, nothing to plan");
            return Ok(Vec::new());
        }

        let mut pending = vec![query.clone()];
        let mut emitted = Vec::new();

        while let Some(current) = pending.pop() {
            let score = self.estimator.score(&current)?;
            match self.next_split(&current, &score)? {
                Some((dimension, chunk_size)) => {
                    let ids = current
                        .dimension(dimension)
                        .ids()
                        .ok_or(Error::UnresolvedDimension(dimension))?;
                    let chunks: Vec<Query> = ids
                        .chunks(chunk_size)
                        .map(|chunk| current.with_ids(dimension, chunk))
                        .collect();
                    pending.extend(chunks.into_iter().rev());
                }
                None => emitted.push(current),
            }
        }

        Ok(emitted)
    }

    /// Dimension and chunk size for the next split, `None` once `query` fits.
    fn next_split(
        &self,
        query: &Query,
        score: &ComplexityScore,
    ) -> Result<Option<(Dimension, usize)>> {
        if !score.within(self.settings.limit) {
            if let Some(dimension) = score.dominant_splittable() {
                let others = score.product_excluding(dimension).max(1);
                let chunk =
                    usize::try_from((self.settings.limit / others).max(1)).unwrap_or(usize::MAX);
                // a chunk must be strictly smaller than the dimension to make progress
                let chunk = chunk.min(score.cardinality(dimension) - 1).max(1);
                return Ok(Some((dimension, chunk)));
            }
        }

        for dimension in Dimension::ALL {
            if let Some(cap) = self.settings.chunk_sizes.get(dimension) {
                if score.cardinality(dimension) > cap {
                    return Ok(Some((dimension, cap)));
                }
            }
        }

        if let Some(budget) = self.settings.url_budget {
            let length = wire::encoded_len(query)?;
            if length > budget {
                let mut candidate: Option<(usize, u8, Dimension)> = None;
                for dimension in Dimension::ALL {
                    if score.cardinality(dimension) < 2 {
                        continue;
                    }
                    let key = (
                        wire::dimension_encoded_len(query, dimension)?,
                        dimension.split_preference(),
                        dimension,
                    );
                    if candidate.map_or(true, |best| (key.0, key.1) > (best.0, best.1)) {
                        candidate = Some(key);
                    }
                }
                match candidate {
                    Some((_, _, dimension)) => {
                        let half = score.cardinality(dimension).div_ceil(2);
                        return Ok(Some((dimension, half)));
                    }
                    None => warn!(
                        length,
                        budget,
                        "sub-query exceeds URL budget but cannot be split further"
                    ),
                }
            }
        }

        Ok(None)
    }
}
