use thiserror::Error;

use facet_connection::ConnectionError;
use facet_store::StoreError;
use facet_types::TypeError;
use facet_view::ViewError;

/// Failure produced by a transport implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request never produced a response (connectivity, timeout).
    #[error("network failure: {0}")]
    Network(String),
    /// The server received the request and rejected it.
    #[error("request rejected: {0}")]
    Validation(String),
}

/// Errors surfaced by the client facade.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport failure: {0}")]
    Transport(String),

    /// Server-side rejection; the message passes through to the caller.
    #[error("{0}")]
    Validation(String),

    /// The operation resolved to a payload shape the call cannot consume.
    #[error("unexpected payload for operation '{operation}': {reason}")]
    UnexpectedPayload { operation: String, reason: String },

    /// The client was torn down; no further operations are accepted.
    #[error("client is torn down")]
    TornDown,

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl From<TransportError> for ClientError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Network(message) => Self::Transport(message),
            TransportError::Validation(message) => Self::Validation(message),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
