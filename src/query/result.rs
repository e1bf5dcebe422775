//! Reassembly of sub-query outcomes into one logical result.

use super::executor::{BatchReport, Row, SubQueryOutcome};
use super::model::Query;
use super::retry::FailureKind;
use serde::Serialize;
use std::collections::HashMap;

/// A portion of the query that produced no rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub sequence: usize,
    pub query: Query,
    pub kind: FailureKind,
    pub attempts: u32,
    pub message: String,
}

/// Counters describing how the result was obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    /// Sub-queries in the final plan
    pub planned: usize,
    pub succeeded: usize,
    pub replans: u32,
    /// Complexity limit in force at the end of the run
    pub final_limit: u64,
}

/// Rows of every successful sub-query plus the manifest of the ones that
/// failed. Check [`QueryResult::is_complete`] before trusting the rows as the
/// full answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    rows: Vec<Row>,
    manifest: Vec<ManifestEntry>,
    pub stats: ExecutionStats,
}

impl QueryResult {
    pub fn is_complete(&self) -> bool {
        self.manifest.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Failed sub-queries in plan order.
    pub fn manifest(&self) -> &[ManifestEntry] {
        &self.manifest
    }

    /// Rows that occur more than once.
    ///
    /// Sub-queries partition the identifier space, so this is empty unless
    /// the plan overlapped. Not used to filter rows.
    pub fn duplicate_rows(&self) -> Vec<&Row> {
        let mut seen: HashMap<&Row, usize> = HashMap::new();
        let mut duplicates = Vec::new();
        for row in &self.rows {
            let count = seen.entry(row).or_insert(0);
            *count += 1;
            if *count == 2 {
                duplicates.push(row);
            }
        }
        duplicates
    }
}

/// Builds a [`QueryResult`] from sub-query outcomes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Concatenate successful rows in plan order and list every failure.
    pub fn assemble(&self, outcomes: Vec<SubQueryOutcome>) -> QueryResult {
        let mut outcomes = outcomes;
        outcomes.sort_by_key(|o| o.sequence);

        let mut result = QueryResult {
            stats: ExecutionStats {
                planned: outcomes.len(),
                ..Default::default()
            },
            ..Default::default()
        };

        for outcome in outcomes {
            match outcome.result {
                Ok(rows) => {
                    result.stats.succeeded += 1;
                    result.rows.extend(rows);
                }
                Err(failure) => result.manifest.push(ManifestEntry {
                    sequence: outcome.sequence,
                    query: outcome.query,
                    kind: failure.kind,
                    attempts: outcome.attempts,
                    message: failure.message,
                }),
            }
        }
        result
    }

    /// Assemble a batch run, carrying over its re-plan counters.
    pub fn assemble_report(&self, report: BatchReport) -> QueryResult {
        let mut result = self.assemble(report.outcomes);
        result.stats.replans = report.replans;
        result.stats.final_limit = report.final_limit;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::executor::SubQueryFailure;

    fn query(unit: &str) -> Query {
        Query::builder().items(["i"]).units([unit]).periods(["p"]).build()
    }

    fn ok(sequence: usize, rows: &[&str]) -> SubQueryOutcome {
        SubQueryOutcome {
            sequence,
            query: query(&format!("u{sequence}")),
            result: Ok(rows.iter().map(|r| vec![r.to_string()]).collect()),
            attempts: 1,
        }
    }

    fn failed(sequence: usize, kind: FailureKind) -> SubQueryOutcome {
        SubQueryOutcome {
            sequence,
            query: query(&format!("u{sequence}")),
            result: Err(SubQueryFailure {
                kind,
                message: "boom".into(),
            }),
            attempts: 3,
        }
    }

    #[test]
    fn test_rows_follow_plan_order() {
        let result =
            ResultAssembler::new().assemble(vec![ok(2, &["c"]), ok(0, &["a"]), ok(1, &["b"])]);
        assert!(result.is_complete());
        assert_eq!(
            result.rows(),
            &[vec!["a".to_string()], vec!["b".to_string()], vec!["c".to_string()]]
        );
        assert_eq!(result.stats.planned, 3);
        assert_eq!(result.stats.succeeded, 3);
    }

    #[test]
    fn test_failures_go_to_manifest() {
        let result = ResultAssembler::new().assemble(vec![
            ok(0, &["a"]),
            failed(2, FailureKind::Cancelled),
            failed(1, FailureKind::Transient),
        ]);
        assert!(!result.is_complete());
        assert_eq!(result.rows().len(), 1);
        let kinds: Vec<_> = result.manifest().iter().map(|e| (e.sequence, e.kind)).collect();
        assert_eq!(kinds, vec![(1, FailureKind::Transient), (2, FailureKind::Cancelled)]);
        assert_eq!(result.manifest()[0].attempts, 3);
    }

    #[test]
    fn test_duplicates_are_reported_not_removed() {
        let result = ResultAssembler::new().assemble(vec![ok(0, &["a", "b"]), ok(1, &["a", "a"])]);
        assert_eq!(result.rows().len(), 4);
        assert_eq!(result.duplicate_rows(), vec![&vec!["a".to_string()]]);
    }

    #[test]
    fn test_empty_outcomes_are_complete() {
        let result = ResultAssembler::new().assemble(Vec::new());
        assert!(result.is_complete());
        assert!(result.rows().is_empty());
    }
}
