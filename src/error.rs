//! Error types for the retrieval core.

/// Top-level error type for the hindsight stores.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// Underlying SQLite engine error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error (directory creation, backup files).
    #[error("I/O error: {0}")]
    Io(String),

    /// Connection mutex poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    Lock(String),

    /// An embedding was requested before any vocabulary was built.
    #[error("vocabulary not built; run build_vocabulary or index_all_knowledge first")]
    VocabularyNotBuilt,

    /// A vector with the wrong number of dimensions was supplied.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RetrievalError>;
