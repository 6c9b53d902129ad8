use thiserror::Error;

/// Result type for semantic search operations
pub type Result<T> = std::result::Result<T, SemanticError>;

/// Errors that can occur while embedding, clustering or searching
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Failed to load embedding model: {0}")]
    ModelLoadError(String),

    #[error("Failed to generate embeddings: {0}")]
    EmbeddingError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Search engine has no encoder attached")]
    NotReady,

    #[error("Row count mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Core(#[from] issuekb_core::Error),
}
