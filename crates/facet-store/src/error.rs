use thiserror::Error;

/// Errors from entity store operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The caller supplied an invalid entity identity.
    #[error("invalid entity key: {0}")]
    InvalidKey(#[from] facet_types::TypeError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
