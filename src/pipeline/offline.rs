//! Build phase: tables -> embeddings -> fitted index -> artifacts

use crate::artifacts::{IndexArtifacts, LoadedIndex, Manifest};
use crate::catalog::ColumnCatalog;
use crate::config::Config;
use crate::embedding::{Embedder, HashingEmbedder};
use crate::error::{JoinError, Result};
use crate::index::postings::InvertedPostings;
use crate::index::JoinIndex;
use crate::ingestion::{CsvFolderSource, IngestionFailure, TableSource};
use crate::pipeline::{embed_columns, prepare_columns};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// A fitted, populated index plus the columns it was built from
pub struct BuiltIndex {
    pub index: JoinIndex,
    pub catalog: ColumnCatalog,
}

impl BuiltIndex {
    /// Query a fresh build without a round trip through disk
    pub fn into_loaded(self, config: &Config) -> LoadedIndex {
        let manifest = Manifest::describe(&self.index, &self.catalog, config);
        LoadedIndex {
            index: self.index,
            catalog: self.catalog,
            manifest,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub tables_loaded: usize,
    pub tables_failed: Vec<IngestionFailure>,
    pub columns_indexed: usize,
    pub columns_skipped_short: usize,
    pub columns_skipped_filtered: usize,
    pub columns_skipped_duplicate: usize,
    pub embeddings: usize,
    pub postings: usize,
    pub cells: usize,
    pub pivots_k: usize,
    pub grid_levels: usize,
    pub elapsed_ms: u128,
}

/// Embed every key column of every table, fit the index once on all
/// embeddings and record a posting per row.
#[instrument(skip_all)]
pub fn run_offline(
    source: &dyn TableSource,
    embedder: &dyn Embedder,
    config: &Config,
) -> Result<(BuiltIndex, BuildReport)> {
    let started = Instant::now();
    config.validate()?;

    let scan = source.scan()?;
    let prep = prepare_columns(&scan.tables, config, true);
    info!(
        "Embedding {} columns from {} tables",
        prep.columns.len(),
        scan.tables.len()
    );

    let mut catalog = ColumnCatalog::new();
    for (column, vectors) in embed_columns(embedder, prep.columns, config)? {
        catalog.insert(column, vectors);
    }
    if catalog.total_rows() == 0 {
        return Err(JoinError::InsufficientData(
            "no embeddings found in the dataset".to_string(),
        ));
    }

    // Borrowed rows; the corpus is never copied
    let corpus = catalog.rows();
    let mut index = JoinIndex::new(config);
    index.fit(&corpus)?;
    let embeddings = corpus.len();

    // Buffers are computed in parallel and merged by this thread alone, in
    // catalog order, so posting order is reproducible.
    let buffers: Vec<InvertedPostings> = catalog
        .entries()
        .par_iter()
        .map(|entry| {
            index.column_postings(&entry.vectors, &entry.column.table, &entry.column.column)
        })
        .collect::<Result<_>>()?;
    for buffer in buffers {
        index.merge_postings(buffer)?;
    }

    let report = BuildReport {
        tables_loaded: scan.tables.len(),
        tables_failed: scan.failures,
        columns_indexed: catalog.len(),
        columns_skipped_short: prep.skipped_short,
        columns_skipped_filtered: prep.skipped_filtered,
        columns_skipped_duplicate: prep.skipped_duplicate,
        embeddings,
        postings: index.postings().size(),
        cells: index.postings().cell_count(),
        pivots_k: index.projector().k(),
        grid_levels: index.grid().levels(),
        elapsed_ms: started.elapsed().as_millis(),
    };
    if !report.tables_failed.is_empty() {
        warn!("{} tables could not be loaded", report.tables_failed.len());
    }
    info!(
        "Built index: {} columns, {} postings in {} cells ({} ms)",
        report.columns_indexed, report.postings, report.cells, report.elapsed_ms
    );

    Ok((BuiltIndex { index, catalog }, report))
}

/// Build from a CSV/TSV folder with the hashing embedder and persist the
/// artifacts to `out_dir`
pub fn build_and_save(dataset_dir: &Path, out_dir: &Path, config: &Config) -> Result<BuildReport> {
    let source = CsvFolderSource::new(dataset_dir);
    let embedder = HashingEmbedder::new(config.embedding_dim);
    let (built, report) = run_offline(&source, &embedder, config)?;

    IndexArtifacts::from_build(&built.index, &built.catalog, config)?.save(out_dir)?;
    Ok(report)
}
