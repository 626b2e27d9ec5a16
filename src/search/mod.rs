//! Two-phase search: blocking (cell co-location + τ filter) then verification.

pub mod blocking;
pub mod verify;

pub use blocking::{BlockResult, Blocker, CandidateMatches};
pub use verify::Verifier;

use crate::catalog::VectorLookup;
use crate::config::Config;
use crate::error::Result;
use crate::index::JoinIndex;
use crate::types::{ColumnId, Embedding, JoinableResult, TableId};

/// Outcome of searching one query column
#[derive(Debug, Clone)]
pub struct ColumnSearch {
    pub results: Vec<JoinableResult>,
    pub cells_probed: usize,
    pub postings_scanned: usize,
    pub stale_skipped: usize,
}

/// Blocker and verifier configured together; shared read-only across threads
#[derive(Debug, Clone)]
pub struct Searcher {
    blocker: Blocker,
    verifier: Verifier,
}

impl Searcher {
    pub fn new(config: &Config) -> Self {
        Self {
            blocker: Blocker::new(config),
            verifier: Verifier::new(config),
        }
    }

    /// Leaf-cell lookup, blocking and verification for one query column
    pub fn search_column<V: VectorLookup + ?Sized>(
        &self,
        index: &JoinIndex,
        candidates: &V,
        query_table: &TableId,
        query_column: &ColumnId,
        query_vectors: &[Embedding],
    ) -> Result<ColumnSearch> {
        let postings_by_cell = index.candidate_postings(query_vectors)?;
        let blocked = self.blocker.block(query_vectors, &postings_by_cell, candidates);
        let results = self.verifier.verify(
            query_table,
            query_column,
            query_vectors.len(),
            &blocked.candidates,
        );

        Ok(ColumnSearch {
            results,
            cells_probed: postings_by_cell.len(),
            postings_scanned: blocked.postings_scanned,
            stale_skipped: blocked.stale_skipped,
        })
    }

    pub fn blocker(&self) -> &Blocker {
        &self.blocker
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }
}
