//! Similarity index: pivot projection, hierarchical grid and inverted postings.

pub mod coordinator;
pub mod grid;
pub mod pivots;
pub mod postings;

pub use coordinator::JoinIndex;
pub use grid::HierarchicalGrid;
pub use pivots::{PcaPivots, PivotProjector, PivotStrategy, RandomPivots};
pub use postings::InvertedPostings;

/// Euclidean (L2) distance between two equal-width vectors
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f32>()
        .sqrt()
}
