use async_trait::async_trait;
use serde_json::Value;

use facet_types::Payload;

use crate::error::TransportError;

/// The request seam the client consumes.
///
/// An implementation resolves a named operation with a JSON argument object
/// into a payload tree. The client never retries or pools; one call, one
/// response. Failures are either [`TransportError::Network`] (no response)
/// or [`TransportError::Validation`] (server said no), and both trigger the
/// same rollback path for optimistic mutations.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, operation: &str, args: Value) -> Result<Payload, TransportError>;
}
