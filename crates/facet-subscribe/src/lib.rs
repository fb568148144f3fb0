//! Subscription and invalidation layer.
//!
//! Tracks which active reads depend on which `(key, field)` pairs. On every
//! store invalidation signal, subscriptions whose dependency set intersects
//! the signal are re-resolved; a callback fires only when the masked value
//! structurally changed. This is the mechanism by which an optimistic patch
//! to one entity is instantly visible to every other open view over that
//! same entity.

pub mod handle;
pub mod registry;

pub use handle::SubscriptionHandle;
pub use registry::{SubscriptionId, SubscriptionRegistry, SubscriptionTarget};
