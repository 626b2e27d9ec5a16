//! Query phase: load artifacts, search every query column, report joinable pairs

use crate::artifacts::{load_index, LoadedIndex};
use crate::config::Config;
use crate::embedding::{Embedder, HashingEmbedder};
use crate::error::Result;
use crate::ingestion::{CsvFolderSource, IngestionFailure, TableSource};
use crate::pipeline::{embed_columns, prepare_columns};
use crate::search::{ColumnSearch, Searcher};
use crate::types::JoinableResult;
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, info_span, instrument, warn};

/// Result file written next to the index artifacts
pub const JOINABLE_FILE: &str = "joinable.csv";

const JOINABLE_HEADER: [&str; 5] = [
    "query_file",
    "query_column",
    "file_name",
    "column_name",
    "joinability_score",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryReport {
    pub tables_loaded: usize,
    pub tables_failed: Vec<IngestionFailure>,
    pub columns_queried: usize,
    pub columns_skipped_short: usize,
    pub columns_skipped_duplicate: usize,
    pub cells_probed: usize,
    pub postings_scanned: usize,
    pub stale_skipped: usize,
    pub pairs_verified: usize,
    pub joinable_pairs: usize,
    pub elapsed_ms: u128,
}

/// Search every column of every query table against a loaded index.
///
/// Returns all verified pairs (joinable or not) in query column order, each
/// column's pairs ranked by joinability.
#[instrument(skip_all)]
pub fn run_online(
    source: &dyn TableSource,
    embedder: &dyn Embedder,
    loaded: &LoadedIndex,
    config: &Config,
) -> Result<(Vec<JoinableResult>, QueryReport)> {
    let started = Instant::now();
    config.validate()?;

    let scan = source.scan()?;
    let prep = prepare_columns(&scan.tables, config, false);
    let queries = embed_columns(embedder, prep.columns, config)?;

    let searcher = Searcher::new(config);
    let searches: Vec<ColumnSearch> = queries
        .par_iter()
        .map(|(column, vectors)| {
            let _span = info_span!("query_column", column = %column).entered();
            let search = searcher.search_column(
                &loaded.index,
                &loaded.catalog,
                &column.table,
                &column.column,
                vectors,
            )?;
            info!(
                "{} candidates verified, {} joinable",
                search.results.len(),
                search.results.iter().filter(|r| r.is_joinable).count()
            );
            Ok(search)
        })
        .collect::<Result<_>>()?;

    let mut report = QueryReport {
        tables_loaded: scan.tables.len(),
        tables_failed: scan.failures,
        columns_queried: queries.len(),
        columns_skipped_short: prep.skipped_short,
        columns_skipped_duplicate: prep.skipped_duplicate,
        ..QueryReport::default()
    };
    let mut results = Vec::new();
    for search in searches {
        report.cells_probed += search.cells_probed;
        report.postings_scanned += search.postings_scanned;
        report.stale_skipped += search.stale_skipped;
        results.extend(search.results);
    }
    report.pairs_verified = results.len();
    report.joinable_pairs = results.iter().filter(|r| r.is_joinable).count();
    report.elapsed_ms = started.elapsed().as_millis();

    if report.stale_skipped > 0 {
        warn!("{} stale postings skipped", report.stale_skipped);
    }
    info!(
        "Queried {} columns: {} joinable of {} verified pairs ({} ms)",
        report.columns_queried, report.joinable_pairs, report.pairs_verified, report.elapsed_ms
    );

    Ok((results, report))
}

/// Write joinable pairs only; returns the number of rows written
pub fn write_joinable_csv(path: &Path, results: &[JoinableResult]) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(JOINABLE_HEADER)?;

    let mut written = 0;
    for result in results.iter().filter(|r| r.is_joinable) {
        let score = result.joinability.to_string();
        writer.write_record([
            result.query_table.name(),
            result.query_column.name(),
            result.candidate_table.name(),
            result.candidate_column.name(),
            score.as_str(),
        ])?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Load the index from `index_dir`, query every CSV/TSV in `query_dir` with
/// the hashing embedder and write `joinable.csv` into `index_dir`
pub fn query_and_save(query_dir: &Path, index_dir: &Path, config: &Config) -> Result<QueryReport> {
    let loaded = load_index(index_dir, config)?;
    let source = CsvFolderSource::new(query_dir);
    let embedder = HashingEmbedder::new(config.embedding_dim);

    let (results, report) = run_online(&source, &embedder, &loaded, config)?;
    let out = index_dir.join(JOINABLE_FILE);
    let written = write_joinable_csv(&out, &results)?;
    info!("Wrote {} joinable pairs to {}", written, out.display());
    Ok(report)
}
