//! Pivot Projector
//!
//! Reduces each embedding to a `k`-length distance signature relative to a
//! fixed set of reference directions. Pivot selection is a strategy object so
//! the grid and postings layers never depend on how pivots were chosen.
//!
//! The default strategy takes the principal directions of a seeded corpus
//! sample (power iteration with deflation on the covariance matrix). Fitting
//! is sequential; projection is data-parallel.

use crate::config::{Config, PivotStrategyKind};
use crate::error::{JoinError, Result};
use crate::index::euclidean_distance;
use crate::types::{Embedding, Signature};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

const POWER_ITERATIONS: usize = 500;
const CONVERGENCE_TOL: f64 = 1e-12;
const DEGENERATE_NORM: f64 = 1e-12;
const RANDOM_DRAWS: usize = 64;

/// Chooses `k` reference directions from a corpus sample
pub trait PivotStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `sample` is non-empty, every row has the same width `d`, and `k <= d`.
    /// Must return exactly `k` vectors of width `d`.
    fn select(&self, sample: &[&[f32]], k: usize, seed: u64) -> Result<Vec<Embedding>>;
}

/// Principal component directions of the mean-centered sample
#[derive(Debug, Default, Clone, Copy)]
pub struct PcaPivots;

impl PivotStrategy for PcaPivots {
    fn name(&self) -> &'static str {
        "pca"
    }

    fn select(&self, sample: &[&[f32]], k: usize, seed: u64) -> Result<Vec<Embedding>> {
        let d = sample[0].len();
        let mut cov = covariance(sample, d);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut components: Vec<Vec<f64>> = Vec::with_capacity(k);

        for i in 0..k {
            let (direction, eigenvalue) = leading_eigenvector(&cov, d, &components, &mut rng);
            debug!("Principal direction {} eigenvalue {:.6}", i, eigenvalue);
            deflate(&mut cov, d, &direction, eigenvalue);
            components.push(direction);
        }

        Ok(components
            .into_iter()
            .map(|c| c.into_iter().map(|x| x as f32).collect())
            .collect())
    }
}

/// `k` distinct corpus vectors drawn with the seed
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPivots;

impl PivotStrategy for RandomPivots {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select(&self, sample: &[&[f32]], k: usize, seed: u64) -> Result<Vec<Embedding>> {
        let d = sample[0].len();
        let mut rng = StdRng::seed_from_u64(seed);
        let picked = rand::seq::index::sample(&mut rng, sample.len(), k.min(sample.len()));

        let mut pivots: Vec<Embedding> = picked.iter().map(|i| sample[i].to_vec()).collect();

        // Fewer rows than pivots: top up with random unit directions
        while pivots.len() < k {
            let v: Vec<f64> = (0..d).map(|_| rng.gen::<f64>() - 0.5).collect();
            let norm = l2(&v).max(DEGENERATE_NORM);
            pivots.push(v.iter().map(|x| (x / norm) as f32).collect());
        }

        Ok(pivots)
    }
}

/// Strategy object for a configured kind
pub fn strategy_for(kind: PivotStrategyKind) -> Box<dyn PivotStrategy> {
    match kind {
        PivotStrategyKind::Pca => Box::new(PcaPivots),
        PivotStrategyKind::Random => Box::new(RandomPivots),
    }
}

/// Projects embeddings into pivot-distance space
pub struct PivotProjector {
    strategy: Box<dyn PivotStrategy>,
    /// Requested pivot count (clamped to the embedding width at fit time)
    k: usize,
    seed: u64,
    sample_size: usize,
    pivots: Option<Vec<Embedding>>,
}

impl PivotProjector {
    pub fn new(config: &Config) -> Self {
        Self::with_strategy(config, strategy_for(config.pivot_strategy))
    }

    pub fn with_strategy(config: &Config, strategy: Box<dyn PivotStrategy>) -> Self {
        Self {
            strategy,
            k: config.pivots_k,
            seed: config.seed,
            sample_size: config.pivot_sample_size,
            pivots: None,
        }
    }

    /// Rebuild a fitted projector from persisted pivots
    pub fn from_pivots(config: &Config, pivots: Vec<Embedding>) -> Result<Self> {
        let width = pivots
            .first()
            .map(|p| p.len())
            .ok_or_else(|| JoinError::InsufficientData("pivot set is empty".to_string()))?;
        if let Some(bad) = pivots.iter().find(|p| p.len() != width) {
            return Err(JoinError::DimensionMismatch {
                expected: width,
                actual: bad.len(),
            });
        }

        let mut projector = Self::new(config);
        projector.k = pivots.len();
        projector.pivots = Some(pivots);
        Ok(projector)
    }

    /// Select pivots from the corpus. Replaces any previous fit.
    ///
    /// Rows may be owned embeddings or borrowed slices of them.
    pub fn fit<R: AsRef<[f32]> + Sync>(&mut self, corpus: &[R]) -> Result<&[Embedding]> {
        let rows: Vec<&[f32]> = corpus.iter().map(|r| r.as_ref()).collect();
        let first = rows.first().ok_or_else(|| {
            JoinError::InsufficientData("cannot fit pivots on an empty corpus".to_string())
        })?;
        let d = first.len();
        if d == 0 {
            return Err(JoinError::InsufficientData(
                "cannot fit pivots on zero-width embeddings".to_string(),
            ));
        }
        if let Some(bad) = rows.iter().find(|v| v.len() != d) {
            return Err(JoinError::DimensionMismatch {
                expected: d,
                actual: bad.len(),
            });
        }

        let k = self.k.min(d);
        let sample = sample_rows(&rows, self.sample_size, self.seed);
        info!(
            "Fitting {} {} pivots on {} of {} embeddings (d={})",
            k,
            self.strategy.name(),
            sample.len(),
            corpus.len(),
            d
        );

        let pivots = self.strategy.select(&sample, k, self.seed)?;
        if pivots.len() != k || pivots.iter().any(|p| p.len() != d) {
            return Err(JoinError::DimensionMismatch {
                expected: k,
                actual: pivots.len(),
            });
        }

        self.k = k;
        Ok(self.pivots.insert(pivots).as_slice())
    }

    /// Distance signature for every input vector, in input order
    pub fn transform<R: AsRef<[f32]> + Sync>(&self, vectors: &[R]) -> Result<Vec<Signature>> {
        let pivots = self.fitted_pivots()?;
        vectors
            .par_iter()
            .map(|v| project(pivots, v.as_ref()))
            .collect()
    }

    /// Distance signature for a single vector
    pub fn signature(&self, vector: &[f32]) -> Result<Signature> {
        project(self.fitted_pivots()?, vector)
    }

    pub fn pivots(&self) -> Option<&[Embedding]> {
        self.pivots.as_deref()
    }

    pub fn is_fitted(&self) -> bool {
        self.pivots.is_some()
    }

    /// Effective pivot count (final once fitted)
    pub fn k(&self) -> usize {
        self.k
    }

    /// Embedding width the pivots were fitted on
    pub fn dim(&self) -> Option<usize> {
        self.pivots.as_ref().and_then(|p| p.first()).map(|p| p.len())
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    fn fitted_pivots(&self) -> Result<&[Embedding]> {
        self.pivots
            .as_deref()
            .ok_or(JoinError::NotFitted("PivotProjector"))
    }
}

fn project(pivots: &[Embedding], vector: &[f32]) -> Result<Signature> {
    let d = pivots[0].len();
    if vector.len() != d {
        return Err(JoinError::DimensionMismatch {
            expected: d,
            actual: vector.len(),
        });
    }
    Ok(pivots.iter().map(|p| euclidean_distance(vector, p)).collect())
}

/// Seeded uniform sample of at most `max_rows` rows, kept in corpus order
fn sample_rows<'a>(corpus: &[&'a [f32]], max_rows: usize, seed: u64) -> Vec<&'a [f32]> {
    if corpus.len() <= max_rows {
        return corpus.to_vec();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, corpus.len(), max_rows).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| corpus[i]).collect()
}

/// Row-major `d × d` sample covariance in f64
fn covariance(sample: &[&[f32]], d: usize) -> Vec<f64> {
    let n = sample.len();
    let mut mean = vec![0.0f64; d];
    for row in sample {
        for (m, x) in mean.iter_mut().zip(row.iter()) {
            *m += *x as f64;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n as f64);

    let mut cov = vec![0.0f64; d * d];
    let mut centered = vec![0.0f64; d];
    for row in sample {
        for (c, (x, m)) in centered.iter_mut().zip(row.iter().zip(mean.iter())) {
            *c = *x as f64 - m;
        }
        for i in 0..d {
            let ci = centered[i];
            if ci == 0.0 {
                continue;
            }
            let out = &mut cov[i * d..(i + 1) * d];
            for j in i..d {
                out[j] += ci * centered[j];
            }
        }
    }

    let denom = n.saturating_sub(1).max(1) as f64;
    for i in 0..d {
        for j in i..d {
            let value = cov[i * d + j] / denom;
            cov[i * d + j] = value;
            cov[j * d + i] = value;
        }
    }
    cov
}

/// Dominant unit eigenvector orthogonal to `found`, with its eigenvalue
fn leading_eigenvector(
    cov: &[f64],
    d: usize,
    found: &[Vec<f64>],
    rng: &mut StdRng,
) -> (Vec<f64>, f64) {
    let mut v = random_orthonormal(d, found, rng);

    for _ in 0..POWER_ITERATIONS {
        let mut next = mat_vec(cov, d, &v);
        orthogonalize(&mut next, found);
        let norm = l2(&next);
        if norm < DEGENERATE_NORM {
            // No variance left in the remaining subspace
            return (canonical_sign(v), 0.0);
        }
        next.iter_mut().for_each(|x| *x /= norm);

        let delta = 1.0 - dot(&next, &v).abs();
        v = next;
        if delta < CONVERGENCE_TOL {
            break;
        }
    }

    let eigenvalue = dot(&v, &mat_vec(cov, d, &v));
    (canonical_sign(v), eigenvalue)
}

fn deflate(cov: &mut [f64], d: usize, v: &[f64], eigenvalue: f64) {
    for i in 0..d {
        for j in 0..d {
            cov[i * d + j] -= eigenvalue * v[i] * v[j];
        }
    }
}

fn random_orthonormal(d: usize, found: &[Vec<f64>], rng: &mut StdRng) -> Vec<f64> {
    for _ in 0..RANDOM_DRAWS {
        let v: Vec<f64> = (0..d).map(|_| rng.gen::<f64>() - 0.5).collect();
        if let Some(u) = normalized_residual(v, found) {
            return u;
        }
    }

    (0..d)
        .find_map(|j| {
            let mut e = vec![0.0; d];
            e[j] = 1.0;
            normalized_residual(e, found)
        })
        .unwrap_or_else(|| vec![0.0; d])
}

fn normalized_residual(mut v: Vec<f64>, found: &[Vec<f64>]) -> Option<Vec<f64>> {
    orthogonalize(&mut v, found);
    let norm = l2(&v);
    if norm < 1e-6 {
        return None;
    }
    v.iter_mut().for_each(|x| *x /= norm);
    Some(v)
}

fn orthogonalize(v: &mut [f64], basis: &[Vec<f64>]) {
    for b in basis {
        let proj = dot(v, b);
        for (x, y) in v.iter_mut().zip(b.iter()) {
            *x -= proj * y;
        }
    }
}

/// Flip so the largest-magnitude component is positive
fn canonical_sign(mut v: Vec<f64>) -> Vec<f64> {
    let pivot = v
        .iter()
        .copied()
        .fold(0.0f64, |best, x| if x.abs() > best.abs() { x } else { best });
    if pivot < 0.0 {
        v.iter_mut().for_each(|x| *x = -*x);
    }
    v
}

fn mat_vec(m: &[f64], d: usize, v: &[f64]) -> Vec<f64> {
    m.chunks_exact(d).map(|row| dot(row, v)).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}
