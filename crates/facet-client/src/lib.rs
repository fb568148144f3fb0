//! Client facade for facet.
//!
//! Ties the store, view masking, subscriptions, and connection management
//! together behind one handle, and owns the two pieces that touch the
//! outside world: the transport seam and the optimistic mutation journal.
//!
//! # Key Types
//!
//! - [`FacetClient`] — The facade: query, read, subscribe, paginate, mutate
//! - [`Transport`] — The async request seam a host application implements
//! - [`MutationRequest`] — One mutation: operation, input, optimistic patch, response view
//! - [`ClientConfig`] — Page-size and root-identity settings
//! - [`ClientError`] — Everything a client call can fail with

pub mod client;
pub mod config;
pub mod error;
pub mod mutation;
pub mod normalize;
pub mod transport;

pub use client::FacetClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, TransportError};
pub use mutation::MutationRequest;
pub use normalize::{normalize, Normalized, NormalizedPage};
pub use transport::Transport;
