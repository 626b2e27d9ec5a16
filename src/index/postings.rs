//! Inverted Postings Store
//!
//! Maps a leaf grid cell to the (table, column, row) locations whose
//! signature falls in it:
//!
//! ```text
//! CellId -> [Posting]
//! ┌──────────────────────────────────────────────────────────┐
//! │ [1, 0, 3] -> [(people.csv, name, 0), (staff.csv, nm, 7)]  │
//! │ [2, 2, 1] -> [(people.csv, name, 1)]                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Written once during the build phase, read-only afterwards.

use crate::types::{CellId, ColumnId, Posting, TableId};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct InvertedPostings {
    index: HashMap<CellId, Vec<Posting>>,
}

impl InvertedPostings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every row of one column; `leaf_cells[i]` is row `i`'s leaf cell
    pub fn add(&mut self, leaf_cells: &[CellId], table: &TableId, column: &ColumnId) {
        for (row_id, cell) in leaf_cells.iter().enumerate() {
            self.index.entry(cell.clone()).or_default().push(Posting {
                table: table.clone(),
                column: column.clone(),
                row_id,
            });
        }
    }

    /// Append postings produced elsewhere (e.g. a column-scoped buffer)
    pub fn merge(&mut self, other: InvertedPostings) {
        for (cell, postings) in other.index {
            self.index.entry(cell).or_default().extend(postings);
        }
    }

    /// Postings for a cell; empty if the cell was never populated
    pub fn query(&self, cell: &CellId) -> &[Posting] {
        self.index.get(cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total postings across all cells
    pub fn size(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn cell_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellId, &[Posting])> {
        self.index.iter().map(|(cell, postings)| (cell, postings.as_slice()))
    }

    /// Insert a whole posting list, as read back from disk
    pub(crate) fn insert_cell(&mut self, cell: CellId, postings: Vec<Posting>) {
        self.index.entry(cell).or_default().extend(postings);
    }
}
