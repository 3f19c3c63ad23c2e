use thiserror::Error;

/// Errors surfaced by the stores.
///
/// Domain-level failures (bid validation, missing items as seen by a
/// caller) live in the owning service crates; this taxonomy covers the
/// infrastructure below them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No transaction could be started.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A row lock could not be acquired within the configured timeout.
    #[error("lock acquisition timed out")]
    LockTimeout,

    /// The requested row does not exist.
    #[error("row not found")]
    NotFound,

    /// The transaction failed to commit. No external effect has occurred.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// Any other database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
