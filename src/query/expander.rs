//! Hierarchy expansion: turns "node + descendants" references into explicit
//! identifier lists before any complexity estimate is made.

use super::model::{dedup_preserving_order, Dimension, DimensionSpec, HierarchyRef, Query};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors returned by a [`HierarchyResolver`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// The node does not exist; distinct from a node with zero descendants.
    #[error("Unknown hierarchy node '{0}'")]
    UnknownNode(String),

    /// The hierarchy backend could not be reached.
    #[error("Hierarchy service unavailable: {0}")]
    Unavailable(String),

    /// Any other lookup failure.
    #[error("Hierarchy lookup failed: {0}")]
    Other(String),
}

/// Source of descendant identifiers for hierarchy nodes.
#[async_trait]
pub trait HierarchyResolver: Send + Sync {
    /// Descendants of `node`, restricted to `levels` when given.
    async fn descendants(
        &self,
        node: &str,
        levels: Option<&BTreeSet<u32>>,
    ) -> std::result::Result<Vec<String>, ResolverError>;

    /// Resolve several nodes in one round. Results follow the order of `nodes`.
    async fn descendants_many(
        &self,
        nodes: &[String],
        levels: Option<&BTreeSet<u32>>,
    ) -> Vec<std::result::Result<Vec<String>, ResolverError>> {
        futures::future::join_all(nodes.iter().map(|node| self.descendants(node, levels))).await
    }
}

/// Expands symbolic dimension specs through a [`HierarchyResolver`].
#[derive(Clone)]
pub struct HierarchyExpander {
    resolver: Arc<dyn HierarchyResolver>,
}

impl HierarchyExpander {
    pub fn new(resolver: Arc<dyn HierarchyResolver>) -> Self {
        Self { resolver }
    }

    /// Explicit identifiers for one dimension spec.
    pub async fn expand(&self, spec: &DimensionSpec) -> Result<Vec<String>> {
        match spec {
            DimensionSpec::Explicit(ids) => Ok(ids.clone()),
            DimensionSpec::Hierarchical(reference) if !reference.include_descendants => {
                Ok(dedup_preserving_order(reference.parents.iter().cloned()))
            }
            DimensionSpec::Hierarchical(reference) => {
                let parents = dedup_preserving_order(reference.parents.iter().cloned());
                let resolved = self.resolve_batch(reference.level_filter(), &parents).await?;
                Ok(collect_descendants(reference, &resolved))
            }
        }
    }

    /// Copy of `query` with every dimension explicit.
    ///
    /// All descendant lookups of the query are issued together, once per
    /// distinct parent and level filter. Any resolver failure fails the whole
    /// expansion; a partial descendant set would under-cover the query.
    #[instrument(skip_all)]
    pub async fn expand_query(&self, query: &Query) -> Result<Query> {
        if query.is_resolved() {
            return Ok(query.clone());
        }

        // Group lookups by level filter so each group is one batch call.
        let mut groups: BTreeMap<BTreeSet<u32>, Vec<String>> = BTreeMap::new();
        for dimension in Dimension::ALL {
            if let DimensionSpec::Hierarchical(reference) = query.dimension(dimension) {
                if reference.include_descendants {
                    let parents = groups.entry(reference.levels.clone()).or_default();
                    for parent in &reference.parents {
                        if !parents.contains(parent) {
                            parents.push(parent.clone());
                        }
                    }
                }
            }
        }

        let mut resolved: BTreeMap<BTreeSet<u32>, HashMap<String, Vec<String>>> = BTreeMap::new();
        for (levels, parents) in groups {
            let filter = if levels.is_empty() { None } else { Some(&levels) };
            let batch = self.resolve_batch(filter, &parents).await?;
            resolved.insert(levels, batch);
        }

        let mut expanded = query.clone();
        for dimension in Dimension::ALL {
            let ids = match query.dimension(dimension) {
                DimensionSpec::Explicit(_) => continue,
                DimensionSpec::Hierarchical(reference) if !reference.include_descendants => {
                    dedup_preserving_order(reference.parents.iter().cloned())
                }
                DimensionSpec::Hierarchical(reference) => {
                    let empty = HashMap::new();
                    let batch = resolved.get(&reference.levels).unwrap_or(&empty);
                    collect_descendants(reference, batch)
                }
            };
            debug!(%dimension, count = ids.len(), "expanded hierarchical dimension");
            expanded = expanded.with_dimension(dimension, DimensionSpec::Explicit(ids));
        }

        Ok(expanded)
    }

    async fn resolve_batch(
        &self,
        levels: Option<&BTreeSet<u32>>,
        parents: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        if parents.is_empty() {
            return Ok(HashMap::new());
        }

        debug!(parents = parents.len(), ?levels, "resolving hierarchy batch");
        let results = self.resolver.descendants_many(parents, levels).await;
        if results.len() != parents.len() {
            return Err(Error::HierarchyResolution {
                node: parents.join(","),
                source: ResolverError::Other(format!(
                    "resolver returned {} results for {} nodes",
                    results.len(),
                    parents.len()
                )),
            });
        }

        parents
            .iter()
            .zip(results)
            .map(|(parent, result)| {
                result
                    .map(|ids| (parent.clone(), ids))
                    .map_err(|source| Error::HierarchyResolution {
                        node: parent.clone(),
                        source,
                    })
            })
            .collect()
    }
}

/// Concatenate descendants in parent order, dropping identifiers reached
/// through more than one parent.
fn collect_descendants(
    reference: &HierarchyRef,
    resolved: &HashMap<String, Vec<String>>,
) -> Vec<String> {
    dedup_preserving_order(
        reference
            .parents
            .iter()
            .filter_map(|parent| resolved.get(parent))
            .flat_map(|ids| ids.iter().cloned()),
    )
}
