//! Value Embedding
//!
//! The index only consumes unit-length vectors of a fixed width; the
//! [`Embedder`] trait is the seam for any model that produces them.
//!
//! [`HashingEmbedder`] is the bundled default: character unigram, bigram and
//! trigram features hashed into `dim` buckets and L2-normalized. It is
//! deterministic, so identical strings always map to identical vectors.

use crate::error::Result;
use crate::types::Embedding;
use rayon::prelude::*;

/// Produces one unit-L2 vector per input string, preserving order
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;

    fn embed(&self, values: &[String]) -> Result<Vec<Embedding>>;
}

/// Character n-gram feature hashing
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    /// Embed a single value
    pub fn embed_one(&self, value: &str) -> Embedding {
        let mut embedding = vec![0.0f32; self.dim];
        let chars: Vec<char> = value.to_lowercase().chars().collect();

        // Character unigrams
        for ch in &chars {
            let idx = bucket(&[*ch], 1, self.dim);
            embedding[idx] += 1.0;
        }

        // Bigrams and trigrams carry most of the signal for short values
        for window in chars.windows(2) {
            let idx = bucket(window, 2, self.dim);
            embedding[idx] += 2.0;
        }
        for window in chars.windows(3) {
            let idx = bucket(window, 3, self.dim);
            embedding[idx] += 3.0;
        }

        normalize(&mut embedding);
        embedding
    }
}

impl Embedder for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, values: &[String]) -> Result<Vec<Embedding>> {
        Ok(values.par_iter().map(|v| self.embed_one(v)).collect())
    }
}

/// FNV-1a over the n-gram, salted by its length so a unigram and a bigram
/// of the same characters land in different buckets
fn bucket(gram: &[char], order: u64, dim: usize) -> usize {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET ^ order;
    for ch in gram {
        for byte in (*ch as u32).to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(PRIME);
        }
    }
    (hash % dim as u64) as usize
}

/// Scale to unit length; an all-zero vector becomes the first basis vector
fn normalize(embedding: &mut [f32]) {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for e in embedding.iter_mut() {
            *e /= norm;
        }
    } else if let Some(first) = embedding.first_mut() {
        *first = 1.0;
    }
}
