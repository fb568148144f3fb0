use thiserror::Error;

/// Errors produced by type construction and payload decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("entity typename must not be empty")]
    EmptyTypename,

    #[error("entity id must not be empty for typename {0}")]
    EmptyId(String),

    #[error("page size must be greater than zero")]
    ZeroPageSize,
}
