use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(String),

    /// The index (or every sub-index a query needs) has not finished building.
    #[error("Index not ready: {0}")]
    IndexNotReady(String),

    /// Vectors were produced by a different embedder than the one querying them.
    /// The index has to be rebuilt.
    #[error("Embedding dimension mismatch: index has {found}, embedder produces {expected}")]
    EmbeddingMismatch { expected: usize, found: usize },

    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Errors that can only be cleared by rebuilding the index.
    pub fn requires_rebuild(&self) -> bool {
        matches!(self, Error::EmbeddingMismatch { .. } | Error::CorruptArtifact(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
