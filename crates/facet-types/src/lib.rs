//! Foundation types for facet.
//!
//! This crate provides the identity, record, and payload types used
//! throughout the facet system. Every other facet crate depends on
//! `facet-types`.
//!
//! # Key Types
//!
//! - [`EntityKey`] — Globally unique `(typename, id)` identity of a normalized record
//! - [`FieldValue`] — A stored field: scalar, entity reference, or ordered reference list
//! - [`EntityRecord`] — Field-wise map owned by the entity store
//! - [`ViewRef`] — Opaque handle to one entity, resolved through a view
//! - [`ConnectionRef`] — Opaque handle to one logical paginated list
//! - [`Payload`] — The tree of tagged entity fragments a transport returns

pub mod entity;
pub mod error;
pub mod payload;
pub mod refs;

pub use entity::{EntityKey, EntityRecord, FieldValue};
pub use error::TypeError;
pub use payload::{ConnectionPage, EntityFragment, PageInfo, Payload, PayloadValue};
pub use refs::{ConnectionArgs, ConnectionRef, ViewRef};
