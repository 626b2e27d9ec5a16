//! Table Ingestion
//!
//! Sources yield tables of raw string cells; per-table failures are reported
//! alongside the tables that loaded so the caller can skip and continue.

pub mod csv_folder;
pub mod normalize;

pub use csv_folder::CsvFolderSource;
pub use normalize::{normalize_column, EMPTY_VALUE};

use crate::config::Config;
use crate::error::Result;
use crate::types::{ColumnId, TableId};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// One column of raw cell values; `None` is a missing cell
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: ColumnId,
    pub values: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub id: TableId,
    pub columns: Vec<RawColumn>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.columns.iter().map(|c| c.values.len()).max().unwrap_or(0)
    }
}

/// A column after normalization, ready to embed
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedColumn {
    pub name: ColumnId,
    pub values: Vec<String>,
}

/// A table that could not be loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionFailure {
    pub source: String,
    pub reason: String,
}

/// Everything a source produced in one scan
#[derive(Debug, Clone, Default)]
pub struct SourceScan {
    pub tables: Vec<Table>,
    pub failures: Vec<IngestionFailure>,
}

/// Yields tables from some storage location
pub trait TableSource {
    /// Load every table. Only an unreadable source as a whole is an error;
    /// individual bad tables go to `SourceScan::failures`.
    fn scan(&self) -> Result<SourceScan>;
}

/// Tables held in memory; useful for embedding the pipeline in other code
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    tables: Vec<Table>,
}

impl InMemorySource {
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    /// Build a table from `(column, values)` pairs
    pub fn table(name: &str, columns: Vec<(&str, Vec<&str>)>) -> Table {
        Table {
            id: TableId::new(name),
            columns: columns
                .into_iter()
                .map(|(column, values)| RawColumn {
                    name: ColumnId::new(column),
                    values: values.iter().map(|v| Some(v.to_string())).collect(),
                })
                .collect(),
        }
    }
}

impl TableSource for InMemorySource {
    fn scan(&self) -> Result<SourceScan> {
        Ok(SourceScan {
            tables: self.tables.clone(),
            failures: Vec::new(),
        })
    }
}

/// Normalize every column of a table
pub fn normalize_table(table: &Table) -> Vec<NormalizedColumn> {
    table
        .columns
        .iter()
        .map(|c| NormalizedColumn {
            name: c.name.clone(),
            values: normalize_column(&c.values),
        })
        .collect()
}

/// Columns worth comparing for joins: not mostly empty, and (if configured)
/// distinct enough.
pub fn detect_key_columns(columns: &[NormalizedColumn], config: &Config) -> Vec<ColumnId> {
    columns
        .iter()
        .filter(|c| {
            let rows = c.values.len().max(1) as f64;
            let empty = c.values.iter().filter(|v| v.as_str() == EMPTY_VALUE).count();
            if empty as f64 / rows > config.empty_ratio_max {
                return false;
            }
            match config.distinct_ratio_min {
                Some(min) => {
                    let distinct = c
                        .values
                        .iter()
                        .filter(|v| v.as_str() != EMPTY_VALUE)
                        .unique()
                        .count();
                    distinct as f64 / rows >= min
                }
                None => true,
            }
        })
        .map(|c| c.name.clone())
        .collect()
}
