//! Index Coordinator
//!
//! Glues the pivot projector, the hierarchical grid and the postings store
//! and enforces their lifecycle: `fit -> populate -> (persist) -> query`.
//! The grid is fitted on the projector's signatures, never on raw embeddings.

use crate::config::Config;
use crate::error::{JoinError, Result};
use crate::index::grid::HierarchicalGrid;
use crate::index::pivots::PivotProjector;
use crate::index::postings::InvertedPostings;
use crate::types::{CellId, ColumnId, Embedding, Posting, TableId};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// One level of a single-vector lookup
#[derive(Debug, Clone)]
pub struct CellLookup<'a> {
    /// 1-based grid level
    pub level: usize,
    pub cell: CellId,
    /// Only leaf cells carry postings
    pub postings: &'a [Posting],
}

pub struct JoinIndex {
    projector: PivotProjector,
    grid: HierarchicalGrid,
    postings: InvertedPostings,
    fitted: bool,
}

impl JoinIndex {
    pub fn new(config: &Config) -> Self {
        Self::with_projector(config, PivotProjector::new(config))
    }

    /// Use a custom pivot strategy via a pre-built projector
    pub fn with_projector(config: &Config, projector: PivotProjector) -> Self {
        Self {
            projector,
            grid: HierarchicalGrid::new(config),
            postings: InvertedPostings::new(),
            fitted: false,
        }
    }

    /// Reassemble a fitted index from persisted components
    pub fn from_parts(
        projector: PivotProjector,
        grid: HierarchicalGrid,
        postings: InvertedPostings,
    ) -> Result<Self> {
        if !projector.is_fitted() {
            return Err(JoinError::NotFitted("PivotProjector"));
        }
        let dims = grid.dimensions().ok_or(JoinError::NotFitted("HierarchicalGrid"))?;
        if dims != projector.k() {
            return Err(JoinError::DimensionMismatch {
                expected: projector.k(),
                actual: dims,
            });
        }

        Ok(Self {
            projector,
            grid,
            postings,
            fitted: true,
        })
    }

    /// Fit pivots, then the grid on the resulting signatures.
    ///
    /// Refitting discards any postings added under the previous fit.
    #[instrument(skip_all, fields(rows = corpus.len()))]
    pub fn fit<R: AsRef<[f32]> + Sync>(&mut self, corpus: &[R]) -> Result<()> {
        self.fitted = false;
        self.projector.fit(corpus)?;
        let signatures = self.projector.transform(corpus)?;
        self.grid.fit(&signatures)?;

        if !self.postings.is_empty() {
            debug!("Discarding {} postings from previous fit", self.postings.size());
            self.postings = InvertedPostings::new();
        }
        self.fitted = true;
        info!(
            "Index fitted: k={} levels={}",
            self.projector.k(),
            self.grid.levels()
        );
        Ok(())
    }

    /// Project a column, map it to leaf cells and record its postings.
    /// Returns the number of postings added.
    pub fn add_column(
        &mut self,
        vectors: &[Embedding],
        table: &TableId,
        column: &ColumnId,
    ) -> Result<usize> {
        let buffer = self.column_postings(vectors, table, column)?;
        let added = buffer.size();
        self.postings.merge(buffer);
        Ok(added)
    }

    /// Postings for one column in a standalone buffer, without touching the
    /// index. Buffers are merged with [`JoinIndex::merge_postings`].
    pub fn column_postings(
        &self,
        vectors: &[Embedding],
        table: &TableId,
        column: &ColumnId,
    ) -> Result<InvertedPostings> {
        let leaves = self.leaf_cells(vectors)?;
        let mut buffer = InvertedPostings::new();
        buffer.add(&leaves, table, column);
        Ok(buffer)
    }

    pub fn merge_postings(&mut self, buffer: InvertedPostings) -> Result<()> {
        self.ensure_fitted()?;
        self.postings.merge(buffer);
        Ok(())
    }

    /// Finest-level cell of every vector
    pub fn leaf_cells(&self, vectors: &[Embedding]) -> Result<Vec<CellId>> {
        self.ensure_fitted()?;
        let signatures = self.projector.transform(vectors)?;
        self.grid.leaf_cells(&signatures)
    }

    /// Postings of every distinct leaf cell the vectors fall in
    pub fn candidate_postings(&self, vectors: &[Embedding]) -> Result<HashMap<CellId, &[Posting]>> {
        let mut by_cell = HashMap::new();
        for cell in self.leaf_cells(vectors)? {
            if !by_cell.contains_key(&cell) {
                let postings = self.postings.query(&cell);
                by_cell.insert(cell, postings);
            }
        }
        Ok(by_cell)
    }

    /// Per-level cells of a single vector with their current postings
    pub fn lookup(&self, vector: &[f32]) -> Result<Vec<CellLookup<'_>>> {
        self.ensure_fitted()?;
        let signature = self.projector.signature(vector)?;
        let path = self
            .grid
            .transform(std::slice::from_ref(&signature))?
            .pop()
            .unwrap_or_default();

        let levels = self.grid.levels();
        Ok(path
            .into_iter()
            .enumerate()
            .map(|(i, cell)| {
                let postings = if i + 1 == levels {
                    self.postings.query(&cell)
                } else {
                    &[]
                };
                CellLookup {
                    level: i + 1,
                    cell,
                    postings,
                }
            })
            .collect())
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn projector(&self) -> &PivotProjector {
        &self.projector
    }

    pub fn grid(&self) -> &HierarchicalGrid {
        &self.grid
    }

    pub fn postings(&self) -> &InvertedPostings {
        &self.postings
    }

    fn ensure_fitted(&self) -> Result<()> {
        if self.fitted {
            Ok(())
        } else {
            Err(JoinError::NotFitted("JoinIndex"))
        }
    }
}
