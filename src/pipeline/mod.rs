//! Build and query phases.
//!
//! `offline` turns a table collection into a persisted index; `online` loads
//! that index and searches every query column against it. Both phases share
//! the column preparation below: normalize, filter, embed.

pub mod offline;
pub mod online;

pub use offline::{build_and_save, run_offline, BuildReport, BuiltIndex};
pub use online::{query_and_save, run_online, write_joinable_csv, QueryReport, JOINABLE_FILE};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{JoinError, Result};
use crate::ingestion::{detect_key_columns, normalize_table, Table};
use crate::types::{ColumnRef, Embedding};
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::{debug, warn};

/// A normalized column waiting to be embedded
#[derive(Debug, Clone)]
pub(crate) struct PreparedColumn {
    pub column: ColumnRef,
    pub values: Vec<String>,
}

/// Result of column preparation across all tables
#[derive(Debug, Default)]
pub(crate) struct Preparation {
    pub columns: Vec<PreparedColumn>,
    /// Shorter than `min_col_len`
    pub skipped_short: usize,
    /// Rejected by key-column detection
    pub skipped_filtered: usize,
    /// Same (table, column) as a column already prepared
    pub skipped_duplicate: usize,
}

/// Normalize every table and keep the columns worth embedding, in table
/// then column order. Key-column detection only applies when `key_only`.
/// A (table, column) seen twice keeps its first occurrence.
pub(crate) fn prepare_columns(tables: &[Table], config: &Config, key_only: bool) -> Preparation {
    let mut prep = Preparation::default();
    let mut seen: HashSet<ColumnRef> = HashSet::new();

    for table in tables {
        let normalized = normalize_table(table);
        let keys = if key_only {
            detect_key_columns(&normalized, config)
        } else {
            normalized.iter().map(|c| c.name.clone()).collect()
        };

        for column in normalized {
            if !keys.contains(&column.name) {
                debug!("Skipping non-key column {}/{}", table.id, column.name);
                prep.skipped_filtered += 1;
                continue;
            }
            if column.values.len() < config.min_col_len {
                debug!(
                    "Skipping short column {}/{} ({} < {} rows)",
                    table.id,
                    column.name,
                    column.values.len(),
                    config.min_col_len
                );
                prep.skipped_short += 1;
                continue;
            }
            let column_ref = ColumnRef::new(table.id.clone(), column.name);
            if !seen.insert(column_ref.clone()) {
                warn!("Skipping duplicate column {}", column_ref);
                prep.skipped_duplicate += 1;
                continue;
            }
            prep.columns.push(PreparedColumn {
                column: column_ref,
                values: column.values,
            });
        }
    }

    prep
}

/// Embed prepared columns in parallel, preserving their order
pub(crate) fn embed_columns(
    embedder: &dyn Embedder,
    columns: Vec<PreparedColumn>,
    config: &Config,
) -> Result<Vec<(ColumnRef, Vec<Embedding>)>> {
    if embedder.dim() != config.embedding_dim {
        return Err(JoinError::DimensionMismatch {
            expected: config.embedding_dim,
            actual: embedder.dim(),
        });
    }

    columns
        .into_par_iter()
        .map(|prepared| {
            let vectors = embedder.embed(&prepared.values)?;
            if vectors.len() != prepared.values.len() {
                return Err(JoinError::InsufficientData(format!(
                    "embedder returned {} vectors for {} values of {}",
                    vectors.len(),
                    prepared.values.len(),
                    prepared.column
                )));
            }
            if let Some(bad) = vectors.iter().find(|v| v.len() != config.embedding_dim) {
                return Err(JoinError::DimensionMismatch {
                    expected: config.embedding_dim,
                    actual: bad.len(),
                });
            }
            Ok((prepared.column, vectors))
        })
        .collect()
}
