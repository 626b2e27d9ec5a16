//! Hierarchical Grid
//!
//! Partitions signature space into nested cells. For every pivot dimension,
//! level `l` (1-based) splits the observed `[min, max]` range into `2^l`
//! equal bins, so each finer level refines the same span.
//!
//! Bin lookup counts the edges `<=` the value and subtracts one:
//!
//! ```text
//! value <  edges[0]      -> -1
//! value >= edges[last]   -> 2^l   (past the last in-range bin)
//! otherwise              -> i where edges[i] <= value < edges[i + 1]
//! ```
//!
//! Out-of-range indices are used as-is; they are never clamped.

use crate::config::Config;
use crate::error::{JoinError, Result};
use crate::types::{CellId, Signature};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-dimension, per-level bin edges: `edges[dim][level - 1]`
pub type BinEdges = Vec<Vec<Vec<f64>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalGrid {
    levels: usize,
    bin_edges: Option<BinEdges>,
}

impl HierarchicalGrid {
    pub fn new(config: &Config) -> Self {
        Self::with_levels(config.grid_levels)
    }

    pub fn with_levels(levels: usize) -> Self {
        Self {
            levels,
            bin_edges: None,
        }
    }

    /// Rebuild a fitted grid from persisted edges, checking their shape
    pub fn from_edges(levels: usize, bin_edges: BinEdges) -> Result<Self> {
        if levels == 0 {
            return Err(JoinError::InvalidConfig("grid needs at least one level".to_string()));
        }
        for (dim, per_level) in bin_edges.iter().enumerate() {
            if per_level.len() != levels {
                return Err(JoinError::DimensionMismatch {
                    expected: levels,
                    actual: per_level.len(),
                });
            }
            for (l, edges) in per_level.iter().enumerate() {
                let expected = bin_count(l + 1) + 1;
                if edges.len() != expected {
                    return Err(JoinError::DimensionMismatch {
                        expected,
                        actual: edges.len(),
                    });
                }
                if edges.windows(2).any(|w| !(w[0] <= w[1])) {
                    return Err(JoinError::InvalidConfig(format!(
                        "bin edges for dimension {} level {} are not non-decreasing",
                        dim,
                        l + 1
                    )));
                }
            }
        }

        Ok(Self {
            levels,
            bin_edges: Some(bin_edges),
        })
    }

    /// Compute edges from an `n × k` signature matrix. Replaces any previous fit.
    pub fn fit(&mut self, signatures: &[Signature]) -> Result<()> {
        if self.levels == 0 {
            return Err(JoinError::InvalidConfig("grid needs at least one level".to_string()));
        }
        let k = signatures
            .first()
            .map(|s| s.len())
            .ok_or_else(|| {
                JoinError::InsufficientData("cannot fit grid on zero rows".to_string())
            })?;
        if let Some(bad) = signatures.iter().find(|s| s.len() != k) {
            return Err(JoinError::DimensionMismatch {
                expected: k,
                actual: bad.len(),
            });
        }

        let mut bin_edges = Vec::with_capacity(k);
        for dim in 0..k {
            let (min, max) = signatures.iter().map(|s| s[dim] as f64).fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), x| (lo.min(x), hi.max(x)),
            );
            let per_level = (1..=self.levels)
                .map(|level| linspace(min, max, bin_count(level) + 1))
                .collect();
            bin_edges.push(per_level);
        }

        self.bin_edges = Some(bin_edges);
        Ok(())
    }

    /// Cell path for every row: `levels` cells per row, coarsest first
    pub fn transform(&self, signatures: &[Signature]) -> Result<Vec<Vec<CellId>>> {
        let edges = self.fitted_edges()?;
        signatures
            .par_iter()
            .map(|sig| self.cell_path(edges, sig))
            .collect()
    }

    /// Finest-level cell for every row
    pub fn leaf_cells(&self, signatures: &[Signature]) -> Result<Vec<CellId>> {
        let edges = self.fitted_edges()?;
        signatures
            .par_iter()
            .map(|sig| cell_at(edges, sig, self.levels))
            .collect()
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn is_fitted(&self) -> bool {
        self.bin_edges.is_some()
    }

    pub fn bin_edges(&self) -> Option<&BinEdges> {
        self.bin_edges.as_ref()
    }

    /// Number of pivot dimensions the grid was fitted on
    pub fn dimensions(&self) -> Option<usize> {
        self.bin_edges.as_ref().map(|e| e.len())
    }

    fn cell_path(&self, edges: &BinEdges, sig: &[f32]) -> Result<Vec<CellId>> {
        (1..=self.levels).map(|level| cell_at(edges, sig, level)).collect()
    }

    fn fitted_edges(&self) -> Result<&BinEdges> {
        self.bin_edges
            .as_ref()
            .ok_or(JoinError::NotFitted("HierarchicalGrid"))
    }
}

/// Bins at a 1-based level
pub fn bin_count(level: usize) -> usize {
    1usize << level
}

/// Bin index of `value` within `edges` (see module docs for out-of-range values)
pub fn bin_index(value: f64, edges: &[f64]) -> i32 {
    edges.partition_point(|e| *e <= value) as i32 - 1
}

fn cell_at(edges: &BinEdges, sig: &[f32], level: usize) -> Result<CellId> {
    if sig.len() != edges.len() {
        return Err(JoinError::DimensionMismatch {
            expected: edges.len(),
            actual: sig.len(),
        });
    }
    Ok(CellId(
        sig.iter()
            .zip(edges.iter())
            .map(|(value, per_level)| bin_index(*value as f64, &per_level[level - 1]))
            .collect(),
    ))
}

/// `count` evenly spaced values from `start` to `stop`, both inclusive
fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    let steps = (count - 1) as f64;
    let step = (stop - start) / steps;
    let mut out: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
    // Pin the endpoint so the training maximum is an exact edge
    if let Some(last) = out.last_mut() {
        *last = stop;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signatures() -> Vec<Signature> {
        vec![
            vec![0.0, 1.0],
            vec![0.25, 1.5],
            vec![0.5, 1.2],
            vec![1.0, 2.0],
        ]
    }

    fn fitted(levels: usize) -> HierarchicalGrid {
        let mut grid = HierarchicalGrid::with_levels(levels);
        grid.fit(&signatures()).unwrap();
        grid
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let grid = HierarchicalGrid::with_levels(2);
        assert!(matches!(
            grid.transform(&signatures()),
            Err(JoinError::NotFitted(_))
        ));
        assert!(matches!(
            grid.leaf_cells(&signatures()),
            Err(JoinError::NotFitted(_))
        ));
    }

    #[test]
    fn test_fit_on_zero_rows_is_insufficient() {
        let mut grid = HierarchicalGrid::with_levels(2);
        assert!(matches!(grid.fit(&[]), Err(JoinError::InsufficientData(_))));
        assert!(!grid.is_fitted());
    }

    #[test]
    fn test_edges_are_monotonic_and_double_per_level() {
        let grid = fitted(4);
        let edges = grid.bin_edges().unwrap();
        assert_eq!(edges.len(), 2);

        for per_level in edges {
            assert_eq!(per_level.len(), 4);
            for (l, level_edges) in per_level.iter().enumerate() {
                let level = l + 1;
                assert_eq!(level_edges.len(), (1 << level) + 1);
                assert!(level_edges.windows(2).all(|w| w[0] <= w[1]));
                if l > 0 {
                    let coarser_bins = per_level[l - 1].len() - 1;
                    assert_eq!(level_edges.len() - 1, coarser_bins * 2);
                }
            }
        }
    }

    #[test]
    fn test_levels_refine_the_same_span() {
        let grid = fitted(3);
        let edges = grid.bin_edges().unwrap();
        for per_level in edges {
            for pair in per_level.windows(2) {
                let (coarse, fine) = (&pair[0], &pair[1]);
                assert_eq!(coarse.first(), fine.first());
                assert_eq!(coarse.last(), fine.last());
                // Every coarse edge is also a fine edge
                for (i, e) in coarse.iter().enumerate() {
                    assert!((fine[i * 2] - e).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_cell_path_shape() {
        let grid = fitted(3);
        let paths = grid.transform(&signatures()).unwrap();
        assert_eq!(paths.len(), 4);
        for path in &paths {
            assert_eq!(path.len(), 3);
            assert!(path.iter().all(|c| c.arity() == 2));
        }
        let leaves = grid.leaf_cells(&signatures()).unwrap();
        let last: Vec<CellId> = paths.iter().map(|p| p.last().unwrap().clone()).collect();
        assert_eq!(leaves, last);
    }

    #[test]
    fn test_bin_index_in_range() {
        let edges = [0.0, 0.25, 0.5, 0.75, 1.0];
        assert_eq!(bin_index(0.0, &edges), 0);
        assert_eq!(bin_index(0.1, &edges), 0);
        assert_eq!(bin_index(0.25, &edges), 1);
        assert_eq!(bin_index(0.74, &edges), 2);
        assert_eq!(bin_index(0.99, &edges), 3);
    }

    /// Out-of-range values keep their raw index: -1 below, 2^l at or above
    /// the top edge. Recall for out-of-distribution queries suffers; clamping
    /// is deliberately not applied.
    #[test]
    fn test_out_of_range_values_are_not_clamped() {
        let edges = [0.0, 0.5, 1.0];
        assert_eq!(bin_index(-0.01, &edges), -1);
        assert_eq!(bin_index(1.0, &edges), 2);
        assert_eq!(bin_index(5.0, &edges), 2);

        let grid = fitted(1);
        let below = grid.leaf_cells(&[vec![-1.0, 0.0]]).unwrap();
        assert_eq!(below[0], CellId(vec![-1, -1]));
        let above = grid.leaf_cells(&[vec![9.0, 9.0]]).unwrap();
        assert_eq!(above[0], CellId(vec![2, 2]));
    }

    #[test]
    fn test_constant_dimension_is_legal() {
        let mut grid = HierarchicalGrid::with_levels(2);
        grid.fit(&[vec![0.5], vec![0.5], vec![0.5]]).unwrap();
        let cells = grid.leaf_cells(&[vec![0.5], vec![0.4]]).unwrap();
        assert_eq!(cells[0], CellId(vec![4]));
        assert_eq!(cells[1], CellId(vec![-1]));
    }

    #[test]
    fn test_identical_signatures_share_leaf() {
        let grid = fitted(3);
        let cells = grid
            .leaf_cells(&[vec![0.3, 1.3], vec![0.3, 1.3], vec![0.31, 1.31]])
            .unwrap();
        assert_eq!(cells[0], cells[1]);
        // Same bins at the finest level means the same leaf
        assert_eq!(cells[0], cells[2]);
    }

    #[test]
    fn test_from_edges_validates_shape() {
        let grid = fitted(2);
        let edges = grid.bin_edges().unwrap().clone();
        let restored = HierarchicalGrid::from_edges(2, edges.clone()).unwrap();
        assert_eq!(restored, grid);

        assert!(HierarchicalGrid::from_edges(3, edges.clone()).is_err());

        let mut bad = edges;
        bad[0][1].reverse();
        assert!(HierarchicalGrid::from_edges(2, bad).is_err());
    }
}
