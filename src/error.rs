//! Error taxonomy for the search core.
//!
//! Every fallible operation on vectors, the record store, the ranker, and the
//! query engine returns [`SearchError`]. Provider implementations, configuration,
//! and the CLI use `anyhow` and are converted at the boundary.

/// Errors surfaced by the search core.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Two vectors (or a vector and the store) disagree on dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A zero-norm vector was used in a similarity computation.
    #[error("degenerate vector: norm is zero")]
    DegenerateVector,

    /// The embedding provider could not produce a vector for `target`.
    #[error("embedding failed for {target}: {reason}")]
    EmbeddingFailure { target: String, reason: String },

    /// No record with this id.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Malformed input, rejected before any work is done.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Insert rejected because the id exists and the store does not replace.
    #[error("duplicate record id: {0}")]
    DuplicateId(String),

    /// Persistent embedding cache failure.
    #[error("embedding cache error: {0}")]
    Cache(String),
}

impl SearchError {
    pub fn embedding_failure(target: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::EmbeddingFailure {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// `true` for [`SearchError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Cache(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
