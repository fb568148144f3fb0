//! Normalized entity store for facet.
//!
//! The store is the single shared mutable resource of the system: a table of
//! entity records keyed by `(typename, id)`. It knows nothing about views.
//! Every mutating call returns an invalidation signal naming the changed
//! `(key, field)` pairs, which the subscription layer consumes.

pub mod error;
pub mod memory;
pub mod signal;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::EntityStore;
pub use signal::Invalidation;
pub use traits::EntityReader;
