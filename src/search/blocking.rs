//! Blocking
//!
//! Cheap candidate pruning: only rows that share a leaf cell with some query
//! row are considered, and only those within `τ = tau_ratio × 2.0` of at least
//! one query vector are kept.
//!
//! Postings and raw embeddings are independently persisted artifacts, so a
//! posting may point past the end of its column (or at a column that was not
//! loaded). Such postings are stale references: skipped and counted, never
//! fatal.

use crate::catalog::VectorLookup;
use crate::config::Config;
use crate::error::{JoinError, Result};
use crate::index::euclidean_distance;
use crate::types::{CellId, ColumnRef, Embedding, Posting};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Matched candidate rows per (table, column); may contain duplicates
pub type CandidateMatches = HashMap<ColumnRef, Vec<usize>>;

#[derive(Debug, Clone, Default)]
pub struct BlockResult {
    pub candidates: CandidateMatches,
    /// Postings visited across all query cells
    pub postings_scanned: usize,
    /// Exact distance computations performed
    pub distance_checks: usize,
    pub stale_skipped: usize,
}

#[derive(Debug, Clone)]
pub struct Blocker {
    tau_threshold: f32,
}

impl Blocker {
    pub fn new(config: &Config) -> Self {
        Self {
            tau_threshold: config.tau_threshold(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.tau_threshold
    }

    /// Distances at exactly τ are retained
    pub fn within_threshold(&self, distance: f32) -> bool {
        distance <= self.tau_threshold
    }

    /// Filter the postings of the query's leaf cells down to rows close to
    /// at least one query vector.
    pub fn block<V: VectorLookup + ?Sized>(
        &self,
        query: &[Embedding],
        postings_by_cell: &HashMap<CellId, &[Posting]>,
        candidates: &V,
    ) -> BlockResult {
        let mut result = BlockResult::default();

        for postings in postings_by_cell.values() {
            for posting in postings.iter() {
                result.postings_scanned += 1;

                let candidate = match resolve(posting, candidates) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("Skipping posting: {}", e);
                        result.stale_skipped += 1;
                        continue;
                    }
                };

                let mut matched = false;
                for q in query {
                    result.distance_checks += 1;
                    if self.within_threshold(euclidean_distance(q, candidate)) {
                        matched = true;
                        break;
                    }
                }

                if matched {
                    result
                        .candidates
                        .entry(posting.column_ref())
                        .or_default()
                        .push(posting.row_id);
                }
            }
        }

        if result.stale_skipped > 0 {
            warn!(
                "Skipped {} stale postings out of {}",
                result.stale_skipped, result.postings_scanned
            );
        }
        result
    }
}

/// Exact vector for a posting, or `StaleReference` if it cannot be found
fn resolve<'a, V: VectorLookup + ?Sized>(
    posting: &Posting,
    candidates: &'a V,
) -> Result<&'a [f32]> {
    let column = posting.column_ref();
    let vectors = candidates.column_vectors(&column).unwrap_or(&[]);
    vectors
        .get(posting.row_id)
        .map(Vec::as_slice)
        .ok_or_else(|| JoinError::StaleReference {
            table: column.table.name().to_string(),
            column: column.column.name().to_string(),
            row_id: posting.row_id,
            available: vectors.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnId, TableId};

    fn config(tau_ratio: f64) -> Config {
        Config {
            tau_ratio,
            ..Config::default()
        }
    }

    fn posting(table: &str, column: &str, row_id: usize) -> Posting {
        Posting {
            table: TableId::new(table),
            column: ColumnId::new(column),
            row_id,
        }
    }

    fn col(table: &str, column: &str) -> ColumnRef {
        ColumnRef::new(TableId::new(table), ColumnId::new(column))
    }

    #[test]
    fn test_threshold_boundary() {
        let blocker = Blocker::new(&config(0.25));
        assert_eq!(blocker.threshold(), 0.5);
        assert!(blocker.within_threshold(0.5));
        assert!(!blocker.within_threshold(0.5 + 1e-6));
        assert!(!blocker.within_threshold(0.5 + f32::EPSILON));
    }

    #[test]
    fn test_candidate_exactly_at_threshold_is_kept() {
        // Antipodal unit vectors are exactly 2.0 apart
        let query = vec![vec![1.0, 0.0]];
        let candidates: HashMap<ColumnRef, Vec<Embedding>> =
            [(col("b.csv", "x"), vec![vec![-1.0, 0.0]])].into_iter().collect();
        let list = vec![posting("b.csv", "x", 0)];
        let cells: HashMap<CellId, &[Posting]> =
            [(CellId(vec![0]), list.as_slice())].into_iter().collect();

        let kept = Blocker::new(&config(1.0)).block(&query, &cells, &candidates);
        assert_eq!(kept.candidates[&col("b.csv", "x")], vec![0]);

        let dropped = Blocker::new(&config(0.999_999)).block(&query, &cells, &candidates);
        assert!(dropped.candidates.is_empty());
    }

    #[test]
    fn test_identical_vectors_match_at_zero_tau() {
        let query = vec![vec![0.6, 0.8]];
        let candidates: HashMap<ColumnRef, Vec<Embedding>> =
            [(col("b.csv", "x"), vec![vec![0.6, 0.8], vec![0.8, 0.6]])]
                .into_iter()
                .collect();
        let list = vec![posting("b.csv", "x", 0), posting("b.csv", "x", 1)];
        let cells: HashMap<CellId, &[Posting]> =
            [(CellId(vec![1, 1]), list.as_slice())].into_iter().collect();

        let result = Blocker::new(&config(0.0)).block(&query, &cells, &candidates);
        assert_eq!(result.candidates[&col("b.csv", "x")], vec![0]);
        assert_eq!(result.postings_scanned, 2);
    }

    #[test]
    fn test_stale_postings_are_skipped() {
        let query = vec![vec![1.0, 0.0]];
        let candidates: HashMap<ColumnRef, Vec<Embedding>> =
            [(col("b.csv", "x"), vec![vec![1.0, 0.0]])].into_iter().collect();
        let list = vec![
            posting("b.csv", "x", 0),
            posting("b.csv", "x", 5),
            posting("gone.csv", "y", 0),
        ];
        let cells: HashMap<CellId, &[Posting]> =
            [(CellId(vec![0]), list.as_slice())].into_iter().collect();

        let result = Blocker::new(&config(0.06)).block(&query, &cells, &candidates);
        assert_eq!(result.stale_skipped, 2);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[&col("b.csv", "x")], vec![0]);
    }

    #[test]
    fn test_resolve_reports_stale_reference() {
        let candidates: HashMap<ColumnRef, Vec<Embedding>> =
            [(col("b.csv", "x"), vec![vec![1.0]])].into_iter().collect();
        let err = resolve(&posting("b.csv", "x", 3), &candidates).unwrap_err();
        match err {
            JoinError::StaleReference { row_id, available, .. } => {
                assert_eq!(row_id, 3);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_repeated_postings_yield_duplicate_rows() {
        let query = vec![vec![1.0, 0.0]];
        let candidates: HashMap<ColumnRef, Vec<Embedding>> =
            [(col("b.csv", "x"), vec![vec![1.0, 0.0]])].into_iter().collect();
        let first = vec![posting("b.csv", "x", 0)];
        let second = vec![posting("b.csv", "x", 0)];
        let cells: HashMap<CellId, &[Posting]> = [
            (CellId(vec![0]), first.as_slice()),
            (CellId(vec![1]), second.as_slice()),
        ]
        .into_iter()
        .collect();

        let result = Blocker::new(&config(0.06)).block(&query, &cells, &candidates);
        assert_eq!(result.candidates[&col("b.csv", "x")], vec![0, 0]);
    }

    #[test]
    fn test_posting_is_checked_against_every_query_vector() {
        // Cell 0 belongs to query row 0, but only query row 1 is near the candidate
        let query = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let candidates: HashMap<ColumnRef, Vec<Embedding>> =
            [(col("b.csv", "x"), vec![vec![0.0, 1.0]])].into_iter().collect();
        let list = vec![posting("b.csv", "x", 0)];
        let cells: HashMap<CellId, &[Posting]> =
            [(CellId(vec![0]), list.as_slice())].into_iter().collect();

        let result = Blocker::new(&config(0.06)).block(&query, &cells, &candidates);
        assert_eq!(result.candidates[&col("b.csv", "x")], vec![0]);
        assert_eq!(result.distance_checks, 2);
        assert_eq!(result.postings_scanned, 1);
    }
}
