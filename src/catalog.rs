//! Column Catalog
//!
//! Registry of the columns that went into one index build: an internal id per
//! column (assigned in insertion order), its (table, column) identity and the
//! raw embeddings the blocker re-reads to compute exact distances.

use crate::types::{ColumnRef, Embedding};
use std::collections::HashMap;

/// Source of exact candidate vectors for the blocker
pub trait VectorLookup: Sync {
    fn column_vectors(&self, column: &ColumnRef) -> Option<&[Embedding]>;
}

impl VectorLookup for HashMap<ColumnRef, Vec<Embedding>> {
    fn column_vectors(&self, column: &ColumnRef) -> Option<&[Embedding]> {
        self.get(column).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: usize,
    pub column: ColumnRef,
    pub vectors: Vec<Embedding>,
}

#[derive(Debug, Clone, Default)]
pub struct ColumnCatalog {
    entries: Vec<CatalogEntry>,
    by_column: HashMap<ColumnRef, usize>,
}

impl ColumnCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a column and return its id. Registering the same
    /// (table, column) again replaces its vectors and keeps the old id.
    pub fn insert(&mut self, column: ColumnRef, vectors: Vec<Embedding>) -> usize {
        if let Some(&id) = self.by_column.get(&column) {
            self.entries[id].vectors = vectors;
            return id;
        }
        let id = self.entries.len();
        self.by_column.insert(column.clone(), id);
        self.entries.push(CatalogEntry {
            id,
            column,
            vectors,
        });
        id
    }

    pub fn get(&self, id: usize) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    pub fn id_of(&self, column: &ColumnRef) -> Option<usize> {
        self.by_column.get(column).copied()
    }

    pub fn contains(&self, column: &ColumnRef) -> bool {
        self.by_column.contains_key(column)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total embedded rows across all columns
    pub fn total_rows(&self) -> usize {
        self.entries.iter().map(|e| e.vectors.len()).sum()
    }

    /// Every row of every column, borrowed, concatenated in id order
    pub fn rows(&self) -> Vec<&[f32]> {
        self.entries
            .iter()
            .flat_map(|e| e.vectors.iter().map(Vec::as_slice))
            .collect()
    }
}

impl VectorLookup for ColumnCatalog {
    fn column_vectors(&self, column: &ColumnRef) -> Option<&[Embedding]> {
        self.by_column
            .get(column)
            .map(|&id| self.entries[id].vectors.as_slice())
    }
}
