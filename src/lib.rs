//! Semantic joinable-column discovery.
//!
//! Columns from a table collection are embedded value by value, projected
//! into pivot-distance space and bucketed in a multi-level grid. A query
//! column is matched against the rows sharing its leaf cells, then scored by
//! the fraction of its values that found a close neighbour.

pub mod artifacts;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingestion;
pub mod pipeline;
pub mod search;
pub mod types;

pub use artifacts::{load_index, IndexArtifacts, LoadedIndex};
pub use catalog::{ColumnCatalog, VectorLookup};
pub use config::Config;
pub use embedding::{Embedder, HashingEmbedder};
pub use error::{JoinError, Result};
pub use index::JoinIndex;
pub use pipeline::{run_offline, run_online, BuildReport, BuiltIndex, QueryReport};
pub use search::Searcher;
pub use types::{CellId, ColumnId, ColumnRef, JoinableResult, Posting, TableId};
