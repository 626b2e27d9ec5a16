//! Verification
//!
//! Turns blocked candidates into joinability scores:
//! `joinability = |distinct matched rows| / max(1, query_size)`, joinable
//! when `joinability >= T_ratio`.

use crate::config::Config;
use crate::search::blocking::CandidateMatches;
use crate::types::{ColumnId, JoinableResult, TableId};
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct Verifier {
    t_ratio: f64,
}

impl Verifier {
    pub fn new(config: &Config) -> Self {
        Self {
            t_ratio: config.t_ratio,
        }
    }

    /// Score every candidate column. Results are ordered by joinability
    /// (highest first), then by candidate table and column.
    pub fn verify(
        &self,
        query_table: &TableId,
        query_column: &ColumnId,
        query_size: usize,
        candidates: &CandidateMatches,
    ) -> Vec<JoinableResult> {
        let mut results: Vec<JoinableResult> = candidates
            .iter()
            .map(|(candidate, rows)| {
                let matches = rows.iter().collect::<HashSet<_>>().len();
                let joinability = matches as f64 / query_size.max(1) as f64;
                JoinableResult {
                    query_table: query_table.clone(),
                    query_column: query_column.clone(),
                    candidate_table: candidate.table.clone(),
                    candidate_column: candidate.column.clone(),
                    joinability,
                    is_joinable: self.is_joinable(joinability),
                    matches,
                    query_size,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.joinability
                .partial_cmp(&a.joinability)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.candidate_table.cmp(&b.candidate_table))
                .then_with(|| a.candidate_column.cmp(&b.candidate_column))
        });
        results
    }

    pub fn is_joinable(&self, joinability: f64) -> bool {
        joinability >= self.t_ratio
    }
}
