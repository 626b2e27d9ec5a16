//! Core value types shared by the index and search layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One embedded cell value (unit L2 norm, fixed width per index)
pub type Embedding = Vec<f32>;

/// Distances from one embedding to each pivot
pub type Signature = Vec<f32>;

/// Identifier for a table in the data lake (e.g. "people.csv")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(String);

impl TableId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for a column within a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(String);

impl ColumnId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A (table, column) pair, used as a map key throughout
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: TableId,
    pub column: ColumnId,
}

impl ColumnRef {
    pub fn new(table: TableId, column: ColumnId) -> Self {
        Self { table, column }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.column)
    }
}

/// Grid cell at one level: one bin index per pivot dimension.
///
/// Indices may fall outside `0..2^level` for values outside the fitted range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub Vec<i32>);

impl CellId {
    pub fn arity(&self) -> usize {
        self.0.len()
    }
}

/// One recorded occurrence of a row at a leaf cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Posting {
    pub table: TableId,
    pub column: ColumnId,
    /// Position within the column's value list at build time
    pub row_id: usize,
}

impl Posting {
    pub fn column_ref(&self) -> ColumnRef {
        ColumnRef::new(self.table.clone(), self.column.clone())
    }
}

/// Verification outcome for one (query column, candidate column) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinableResult {
    pub query_table: TableId,
    pub query_column: ColumnId,
    pub candidate_table: TableId,
    pub candidate_column: ColumnId,
    /// Distinct matched candidate rows / query size
    pub joinability: f64,
    pub is_joinable: bool,
    pub matches: usize,
    pub query_size: usize,
}
