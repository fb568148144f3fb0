use thiserror::Error;

/// Errors from connection operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// No page has been loaded for this connection yet.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    /// The most recent page did not declare more data available.
    #[error("connection has no further pages: {0}")]
    NoMorePages(String),

    /// The server declared more data but supplied no continuation cursor.
    #[error("connection is missing a continuation cursor: {0}")]
    MissingCursor(String),
}

/// Result alias for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;
