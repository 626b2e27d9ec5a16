//! Index Artifacts
//!
//! The build phase writes, and the query phase reads back, everything needed
//! to search without refitting:
//!
//! ```text
//! <out_dir>/
//!   manifest.json         build id, timestamp, config snapshot
//!   pivots.json           k × d pivot matrix
//!   grid.json             levels + bin_edges[dim][level]
//!   inverted_index.json   [{cell: [i32; k], postings: [{table, column, row_id}]}]
//!   col_meta.json         {"<id>": {table, column}}
//!   embeddings.json       {"<id>": [[f32; d]]}
//! ```
//!
//! Loading is strict: a missing file, a parse failure or any dimensional
//! inconsistency is `ArtifactCorruption`. Posting row indices are *not*
//! checked here; out-of-range rows are the blocker's business.

use crate::catalog::ColumnCatalog;
use crate::config::Config;
use crate::error::{JoinError, Result};
use crate::index::grid::{bin_count, BinEdges, HierarchicalGrid};
use crate::index::pivots::PivotProjector;
use crate::index::postings::InvertedPostings;
use crate::index::JoinIndex;
use crate::types::{CellId, ColumnRef, Embedding, Posting};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const PIVOTS_FILE: &str = "pivots.json";
pub const GRID_FILE: &str = "grid.json";
pub const POSTINGS_FILE: &str = "inverted_index.json";
pub const COLUMNS_FILE: &str = "col_meta.json";
pub const EMBEDDINGS_FILE: &str = "embeddings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub build_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub embedding_dim: usize,
    pub pivot_strategy: String,
    pub columns: usize,
    pub postings: usize,
    /// Configuration the index was built with
    pub config: Config,
}

impl Manifest {
    /// Fresh build id and timestamp for the given index
    pub fn describe(index: &JoinIndex, catalog: &ColumnCatalog, config: &Config) -> Self {
        Self {
            build_id: Uuid::new_v4(),
            created_at: Utc::now(),
            embedding_dim: index.projector().dim().unwrap_or(config.embedding_dim),
            pivot_strategy: index.projector().strategy_name().to_string(),
            columns: catalog.len(),
            postings: index.postings().size(),
            config: config.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotsFile {
    pub pivots: Vec<Embedding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridFile {
    pub levels: usize,
    pub bin_edges: BinEdges,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellRecord {
    pub cell: CellId,
    pub postings: Vec<Posting>,
}

/// In-memory image of the artifact directory
#[derive(Debug, Clone)]
pub struct IndexArtifacts {
    pub manifest: Manifest,
    pub pivots: PivotsFile,
    pub grid: GridFile,
    pub postings: Vec<CellRecord>,
    pub columns: BTreeMap<usize, ColumnRef>,
    pub embeddings: BTreeMap<usize, Vec<Embedding>>,
}

/// A validated index ready for querying
pub struct LoadedIndex {
    pub index: JoinIndex,
    pub catalog: ColumnCatalog,
    pub manifest: Manifest,
}

impl IndexArtifacts {
    /// Capture a fitted, populated index and its column catalog
    pub fn from_build(index: &JoinIndex, catalog: &ColumnCatalog, config: &Config) -> Result<Self> {
        let pivots = index
            .projector()
            .pivots()
            .ok_or(JoinError::NotFitted("PivotProjector"))?
            .to_vec();
        let bin_edges = index
            .grid()
            .bin_edges()
            .ok_or(JoinError::NotFitted("HierarchicalGrid"))?
            .clone();

        let mut postings: Vec<CellRecord> = index
            .postings()
            .iter()
            .map(|(cell, list)| CellRecord {
                cell: cell.clone(),
                postings: list.to_vec(),
            })
            .collect();
        postings.sort_by(|a, b| a.cell.cmp(&b.cell));

        let columns = catalog
            .entries()
            .iter()
            .map(|e| (e.id, e.column.clone()))
            .collect();
        let embeddings = catalog
            .entries()
            .iter()
            .map(|e| (e.id, e.vectors.clone()))
            .collect();

        Ok(Self {
            manifest: Manifest::describe(index, catalog, config),
            pivots: PivotsFile { pivots },
            grid: GridFile {
                levels: index.grid().levels(),
                bin_edges,
            },
            postings,
            columns,
            embeddings,
        })
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        write_json(&dir.join(MANIFEST_FILE), &self.manifest, true)?;
        write_json(&dir.join(PIVOTS_FILE), &self.pivots, false)?;
        write_json(&dir.join(GRID_FILE), &self.grid, false)?;
        write_json(&dir.join(POSTINGS_FILE), &self.postings, false)?;
        write_json(&dir.join(COLUMNS_FILE), &self.columns, true)?;
        write_json(&dir.join(EMBEDDINGS_FILE), &self.embeddings, false)?;
        info!(
            "Saved index {} to {} ({} columns, {} postings)",
            self.manifest.build_id,
            dir.display(),
            self.manifest.columns,
            self.manifest.postings
        );
        Ok(())
    }

    /// Read every artifact file; no consistency checks beyond parsing
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self {
            manifest: read_json(dir, MANIFEST_FILE)?,
            pivots: read_json(dir, PIVOTS_FILE)?,
            grid: read_json(dir, GRID_FILE)?,
            postings: read_json(dir, POSTINGS_FILE)?,
            columns: read_json(dir, COLUMNS_FILE)?,
            embeddings: read_json(dir, EMBEDDINGS_FILE)?,
        })
    }

    /// Check dimensional consistency against each other and the config
    pub fn validate(&self, config: &Config) -> Result<()> {
        let d = config.embedding_dim;
        let pivots = &self.pivots.pivots;
        if pivots.is_empty() {
            return Err(corrupt("pivot set is empty"));
        }
        if let Some((i, p)) = pivots.iter().enumerate().find(|(_, p)| p.len() != d) {
            return Err(corrupt(format!(
                "pivot {} has dimension {}, configured embedding_dim is {}",
                i,
                p.len(),
                d
            )));
        }
        let k = pivots.len();

        let levels = self.grid.levels;
        if levels == 0 {
            return Err(corrupt("grid has zero levels"));
        }
        if self.grid.bin_edges.len() != k {
            return Err(corrupt(format!(
                "grid has {} dimensions but there are {} pivots",
                self.grid.bin_edges.len(),
                k
            )));
        }
        for (dim, per_level) in self.grid.bin_edges.iter().enumerate() {
            if per_level.len() != levels {
                return Err(corrupt(format!(
                    "grid dimension {} has {} levels, expected {}",
                    dim,
                    per_level.len(),
                    levels
                )));
            }
            for (l, edges) in per_level.iter().enumerate() {
                let expected = bin_count(l + 1) + 1;
                if edges.len() != expected {
                    return Err(corrupt(format!(
                        "grid dimension {} level {} has {} edges, expected {}",
                        dim,
                        l + 1,
                        edges.len(),
                        expected
                    )));
                }
                if edges.windows(2).any(|w| !(w[0] <= w[1])) {
                    return Err(corrupt(format!(
                        "grid dimension {} level {} edges are not non-decreasing",
                        dim,
                        l + 1
                    )));
                }
            }
        }

        if let Some(record) = self.postings.iter().find(|r| r.cell.arity() != k) {
            return Err(corrupt(format!(
                "cell {:?} has arity {}, expected {}",
                record.cell.0,
                record.cell.arity(),
                k
            )));
        }

        let meta_ids: HashSet<usize> = self.columns.keys().copied().collect();
        let embedding_ids: HashSet<usize> = self.embeddings.keys().copied().collect();
        if meta_ids != embedding_ids {
            return Err(corrupt(format!(
                "column metadata ({} ids) and embeddings ({} ids) disagree",
                meta_ids.len(),
                embedding_ids.len()
            )));
        }
        for (id, vectors) in &self.embeddings {
            if let Some(v) = vectors.iter().find(|v| v.len() != d) {
                return Err(corrupt(format!(
                    "embeddings for column {} have dimension {}, expected {}",
                    id,
                    v.len(),
                    d
                )));
            }
        }

        let known: HashSet<&ColumnRef> = self.columns.values().collect();
        for record in &self.postings {
            for posting in &record.postings {
                if !known.contains(&posting.column_ref()) {
                    return Err(corrupt(format!(
                        "posting references unknown column {}/{}",
                        posting.table, posting.column
                    )));
                }
            }
        }

        Ok(())
    }

    /// Validate, then rebuild the runtime index and catalog
    pub fn into_loaded(self, config: &Config) -> Result<LoadedIndex> {
        self.validate(config)?;

        if self.manifest.config.pivots_k != config.pivots_k
            || self.manifest.config.grid_levels != config.grid_levels
        {
            warn!(
                "Index was built with pivots_k={} grid_levels={}; persisted values take precedence",
                self.manifest.config.pivots_k, self.manifest.config.grid_levels
            );
        }

        let projector = PivotProjector::from_pivots(config, self.pivots.pivots)
            .map_err(|e| corrupt(e.to_string()))?;
        let grid = HierarchicalGrid::from_edges(self.grid.levels, self.grid.bin_edges)
            .map_err(|e| corrupt(e.to_string()))?;

        let mut postings = InvertedPostings::new();
        for record in self.postings {
            postings.insert_cell(record.cell, record.postings);
        }
        let index = JoinIndex::from_parts(projector, grid, postings)
            .map_err(|e| corrupt(e.to_string()))?;

        let mut catalog = ColumnCatalog::new();
        let mut embeddings = self.embeddings;
        for (id, column) in self.columns {
            let vectors = embeddings.remove(&id).unwrap_or_default();
            catalog.insert(column, vectors);
        }

        info!(
            "Loaded index {} ({} columns, {} postings)",
            self.manifest.build_id,
            catalog.len(),
            index.postings().size()
        );
        Ok(LoadedIndex {
            index,
            catalog,
            manifest: self.manifest,
        })
    }
}

/// Load and validate the artifact directory
pub fn load_index(dir: &Path, config: &Config) -> Result<LoadedIndex> {
    IndexArtifacts::load(dir)?.into_loaded(config)
}

fn corrupt(message: impl Into<String>) -> JoinError {
    JoinError::ArtifactCorruption(message.into())
}

fn write_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    if pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    } else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let path = dir.join(name);
    let file = File::open(&path)
        .map_err(|e| corrupt(format!("cannot open {}: {}", path.display(), e)))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| corrupt(format!("malformed {}: {}", path.display(), e)))
}
