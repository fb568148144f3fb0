//! Connection and pagination management.
//!
//! A connection is one logical ordered, paginated list, identified by the
//! entity and field (or root operation) producing it plus its arguments.
//! Pages merge incrementally and append-only; changing the arguments is a
//! different logical list with its own independent page sequence.

pub mod error;
pub mod manager;
pub mod state;

pub use error::{ConnectionError, ConnectionResult};
pub use manager::{ConnectionManager, ConnectionSite};
pub use state::{ConnectionState, ConnectionStatus};
