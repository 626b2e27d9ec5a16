use lakejoin::config::Config;
use lakejoin::embedding::Embedder;
use lakejoin::error::Result;
use lakejoin::ingestion::{InMemorySource, Table};
use lakejoin::types::Embedding;

pub const DIM: usize = 8;

/// Maps each known token to its own basis vector, so identical strings are
/// identical vectors and distinct strings sit sqrt(2) apart.
pub struct OneHotEmbedder {
    vocabulary: Vec<&'static str>,
}

impl OneHotEmbedder {
    pub fn new() -> Self {
        Self {
            vocabulary: vec!["x", "y", "z", "w", "q", "p", "r"],
        }
    }
}

impl Embedder for OneHotEmbedder {
    fn dim(&self) -> usize {
        DIM
    }

    fn embed(&self, values: &[String]) -> Result<Vec<Embedding>> {
        Ok(values
            .iter()
            .map(|v| {
                let slot = self
                    .vocabulary
                    .iter()
                    .position(|t| *t == v.as_str())
                    .unwrap_or(DIM - 1);
                let mut e = vec![0.0; DIM];
                e[slot] = 1.0;
                e
            })
            .collect())
    }
}

pub fn config() -> Config {
    Config {
        embedding_dim: DIM,
        t_ratio: 0.5,
        min_col_len: 1,
        ..Config::default()
    }
}

pub fn table_a() -> Table {
    InMemorySource::table("A", vec![("col1", vec!["x", "y", "z", "w"])])
}

pub fn table_b() -> Table {
    InMemorySource::table("B", vec![("col1", vec!["x", "y", "q", "w"])])
}

pub fn lake() -> InMemorySource {
    InMemorySource::new(vec![table_a(), table_b()])
}
