use thiserror::Error;

#[derive(Error, Debug)]
pub enum JoinError {
    /// A transform/query/add/block call ran before the component was fitted
    #[error("{0} has not been fitted yet")]
    NotFitted(&'static str),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// A posting points at a row or column that the loaded embeddings do not have
    #[error("Stale posting reference: {table}/{column} row {row_id} (column has {available} rows)")]
    StaleReference {
        table: String,
        column: String,
        row_id: usize,
        available: usize,
    },

    #[error("Artifact corruption: {0}")]
    ArtifactCorruption(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, JoinError>;
