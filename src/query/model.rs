//! Query data model: dimensions, dimension specs and the immutable `Query`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// One independent axis of an analytics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Data items (data elements, indicators, ...)
    Items,
    /// Organisational / hierarchical units
    Units,
    /// Time periods
    Periods,
}

impl Dimension {
    /// All dimensions in the order they are serialized.
    pub const ALL: [Dimension; 3] = [Dimension::Items, Dimension::Units, Dimension::Periods];

    /// Short dimension key used on the wire (`dx`, `ou`, `pe`).
    pub fn key(&self) -> &'static str {
        match self {
            Dimension::Items => "dx",
            Dimension::Units => "ou",
            Dimension::Periods => "pe",
        }
    }

    /// Tie-break rank when two dimensions share the same cardinality.
    /// Higher wins: units, then periods, then items.
    pub(crate) fn split_preference(&self) -> u8 {
        match self {
            Dimension::Units => 2,
            Dimension::Periods => 1,
            Dimension::Items => 0,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Items => "items",
            Dimension::Units => "units",
            Dimension::Periods => "periods",
        };
        f.write_str(name)
    }
}

/// Reference to one or more hierarchy nodes, optionally including descendants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyRef {
    /// Parent node identifiers, in caller order
    pub parents: Vec<String>,
    /// Expand every parent into its descendants
    #[serde(default)]
    pub include_descendants: bool,
    /// Restrict descendants to these hierarchy levels (empty = all levels)
    #[serde(default)]
    pub levels: BTreeSet<u32>,
}

impl HierarchyRef {
    pub fn new(parent: impl Into<String>) -> Self {
        Self {
            parents: vec![parent.into()],
            include_descendants: false,
            levels: BTreeSet::new(),
        }
    }

    pub fn with_descendants(mut self) -> Self {
        self.include_descendants = true;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn with_levels(mut self, levels: impl IntoIterator<Item = u32>) -> Self {
        self.levels.extend(levels);
        self
    }

    /// Level filter to hand to a resolver, `None` when unfiltered.
    pub fn level_filter(&self) -> Option<&BTreeSet<u32>> {
        if self.levels.is_empty() {
            None
        } else {
            Some(&self.levels)
        }
    }
}

/// Per-dimension selection. A dimension is either an explicit identifier list
/// or a symbolic hierarchy reference, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionSpec {
    Explicit(Vec<String>),
    Hierarchical(HierarchyRef),
}

impl DimensionSpec {
    /// Build an explicit spec. Repeated identifiers are dropped, keeping the
    /// first occurrence.
    pub fn explicit<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DimensionSpec::Explicit(dedup_preserving_order(ids.into_iter().map(Into::into)))
    }

    pub fn hierarchical(reference: HierarchyRef) -> Self {
        DimensionSpec::Hierarchical(reference)
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, DimensionSpec::Explicit(_))
    }

    /// Identifiers of an explicit spec.
    pub fn ids(&self) -> Option<&[String]> {
        match self {
            DimensionSpec::Explicit(ids) => Some(ids),
            DimensionSpec::Hierarchical(_) => None,
        }
    }

    /// Known cardinality. Symbolic specs are unknown until expanded.
    pub fn cardinality(&self) -> Cardinality {
        match self {
            DimensionSpec::Explicit(ids) => Cardinality::Exact(ids.len()),
            DimensionSpec::Hierarchical(_) => Cardinality::Unknown,
        }
    }
}

/// Cardinality of a dimension spec; `Unknown` behaves as +∞.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Exact(usize),
    Unknown,
}

impl Cardinality {
    pub fn exact(&self) -> Option<usize> {
        match self {
            Cardinality::Exact(n) => Some(*n),
            Cardinality::Unknown => None,
        }
    }
}

/// An analytics query over items × units × periods.
///
/// Queries are immutable: splitting produces new values through
/// [`Query::with_dimension`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    items: DimensionSpec,
    units: DimensionSpec,
    periods: DimensionSpec,
    #[serde(default)]
    flags: BTreeMap<String, bool>,
}

impl Query {
    pub fn new(items: DimensionSpec, units: DimensionSpec, periods: DimensionSpec) -> Self {
        Self {
            items,
            units,
            periods,
            flags: BTreeMap::new(),
        }
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    pub fn items(&self) -> &DimensionSpec {
        &self.items
    }

    pub fn units(&self) -> &DimensionSpec {
        &self.units
    }

    pub fn periods(&self) -> &DimensionSpec {
        &self.periods
    }

    pub fn flags(&self) -> &BTreeMap<String, bool> {
        &self.flags
    }

    pub fn dimension(&self, dimension: Dimension) -> &DimensionSpec {
        match dimension {
            Dimension::Items => &self.items,
            Dimension::Units => &self.units,
            Dimension::Periods => &self.periods,
        }
    }

    /// True once every dimension is an explicit identifier list.
    pub fn is_resolved(&self) -> bool {
        Dimension::ALL.iter().all(|d| self.dimension(*d).is_explicit())
    }

    /// Copy of this query with one dimension replaced.
    pub fn with_dimension(&self, dimension: Dimension, spec: DimensionSpec) -> Query {
        let mut next = self.clone();
        match dimension {
            Dimension::Items => next.items = spec,
            Dimension::Units => next.units = spec,
            Dimension::Periods => next.periods = spec,
        }
        next
    }

    /// Copy of this query with one dimension set to an explicit slice.
    pub(crate) fn with_ids(&self, dimension: Dimension, ids: &[String]) -> Query {
        self.with_dimension(dimension, DimensionSpec::Explicit(ids.to_vec()))
    }
}

/// Builder for [`Query`]. Unset dimensions default to an empty selection.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    items: Option<DimensionSpec>,
    units: Option<DimensionSpec>,
    periods: Option<DimensionSpec>,
    flags: BTreeMap<String, bool>,
}

impl QueryBuilder {
    pub fn items<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items = Some(DimensionSpec::explicit(ids));
        self
    }

    pub fn units<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.units = Some(DimensionSpec::explicit(ids));
        self
    }

    pub fn unit_hierarchy(mut self, reference: HierarchyRef) -> Self {
        self.units = Some(DimensionSpec::Hierarchical(reference));
        self
    }

    pub fn periods<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.periods = Some(DimensionSpec::explicit(ids));
        self
    }

    pub fn dimension(mut self, dimension: Dimension, spec: DimensionSpec) -> Self {
        match dimension {
            Dimension::Items => self.items = Some(spec),
            Dimension::Units => self.units = Some(spec),
            Dimension::Periods => self.periods = Some(spec),
        }
        self
    }

    pub fn flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.flags.insert(name.into(), value);
        self
    }

    pub fn build(self) -> Query {
        let empty = || DimensionSpec::Explicit(Vec::new());
        Query {
            items: self.items.unwrap_or_else(empty),
            units: self.units.unwrap_or_else(empty),
            periods: self.periods.unwrap_or_else(empty),
            flags: self.flags,
        }
    }
}

pub(crate) fn dedup_preserving_order(ids: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_spec_drops_repeats() {
        let spec = DimensionSpec::explicit(["a", "b", "a", "c", "b"]);
        assert_eq!(spec.ids().unwrap(), &["a", "b", "c"]);
        assert_eq!(spec.cardinality(), Cardinality::Exact(3));
    }

    #[test]
    fn test_symbolic_cardinality_is_unknown() {
        let spec = DimensionSpec::hierarchical(HierarchyRef::new("root").with_descendants());
        assert_eq!(spec.cardinality(), Cardinality::Unknown);
        assert!(spec.ids().is_none());
    }

    #[test]
    fn test_with_dimension_leaves_original_untouched() {
        let query = Query::builder()
            .items(["i1", "i2"])
            .units(["u1"])
            .periods(["202401"])
            .flag("skipMeta", true)
            .build();
        let narrowed = query.with_ids(Dimension::Items, &["i2".to_string()]);

        assert_eq!(query.items().ids().unwrap().len(), 2);
        assert_eq!(narrowed.items().ids().unwrap(), &["i2"]);
        assert_eq!(narrowed.flags(), query.flags());
    }

    #[test]
    fn test_builder_defaults_to_empty_selection() {
        let query = Query::builder().items(["i1"]).build();
        assert_eq!(query.units().cardinality(), Cardinality::Exact(0));
        assert!(query.is_resolved());
    }

    #[test]
    fn test_dimension_keys() {
        assert_eq!(Dimension::Items.key(), "dx");
        assert_eq!(Dimension::Units.key(), "ou");
        assert_eq!(Dimension::Periods.key(), "pe");
    }
}
