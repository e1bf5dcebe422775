//! Complexity estimation for resolved queries.

use super::model::{Dimension, Query};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Per-dimension cardinalities of a resolved query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComplexityScore {
    pub items: usize,
    pub units: usize,
    pub periods: usize,
}

impl ComplexityScore {
    /// Product of the three cardinalities, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        (self.items as u64)
            .saturating_mul(self.units as u64)
            .saturating_mul(self.periods as u64)
    }

    pub fn cardinality(&self, dimension: Dimension) -> usize {
        match dimension {
            Dimension::Items => self.items,
            Dimension::Units => self.units,
            Dimension::Periods => self.periods,
        }
    }

    /// Product of the two dimensions other than `dimension`.
    pub fn product_excluding(&self, dimension: Dimension) -> u64 {
        Dimension::ALL
            .iter()
            .filter(|d| **d != dimension)
            .fold(1u64, |acc, d| acc.saturating_mul(self.cardinality(*d) as u64))
    }

    /// True when some dimension selects nothing.
    pub fn is_empty(&self) -> bool {
        self.items == 0 || self.units == 0 || self.periods == 0
    }

    pub fn within(&self, limit: u64) -> bool {
        self.total() <= limit
    }

    /// Largest dimension; ties go to units, then periods, then items.
    pub fn dominant(&self) -> Dimension {
        Dimension::ALL
            .iter()
            .copied()
            .max_by_key(|d| (self.cardinality(*d), d.split_preference()))
            .unwrap_or(Dimension::Units)
    }

    /// Largest dimension that still has more than one identifier.
    pub fn dominant_splittable(&self) -> Option<Dimension> {
        Some(self.dominant()).filter(|d| self.cardinality(*d) > 1)
    }
}

impl fmt::Display for ComplexityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}={}", self.items, self.units, self.periods, self.total())
    }
}

/// Scores queries whose dimensions are all explicit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityEstimator;

impl ComplexityEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Score a resolved query. Fails with `UnresolvedDimension` on the first
    /// dimension that is still symbolic.
    pub fn score(&self, query: &Query) -> Result<ComplexityScore> {
        let count = |dimension: Dimension| {
            query
                .dimension(dimension)
                .cardinality()
                .exact()
                .ok_or(Error::UnresolvedDimension(dimension))
        };

        Ok(ComplexityScore {
            items: count(Dimension::Items)?,
            units: count(Dimension::Units)?,
            periods: count(Dimension::Periods)?,
        })
    }
}
