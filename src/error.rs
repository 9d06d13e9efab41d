//! Typed failures for the retrieval and categorization core.
//!
//! The CLI and HTTP boundaries wrap these in `anyhow`; the server maps them
//! back to status codes via downcasting. Per-transaction classification never
//! raises these; it degrades to `(Miscellaneous, 0.0)` locally.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The embedding service could not be reached or exhausted its retries.
    /// Terminal for the ingestion request; nothing partial is persisted.
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The answer generation service could not be reached or exhausted its
    /// retries. Terminal for chat requests.
    #[error("generation service unavailable: {0}")]
    GenerationUnavailable(String),

    /// A vector's length disagrees with the index's established dimension.
    /// The index is left unchanged.
    #[error("vector dimension mismatch: index stores {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A manual override named a category outside the closed enum.
    #[error("unknown category: {0:?}")]
    UnknownCategory(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The caller abandoned a long-running operation via its cancel token.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
