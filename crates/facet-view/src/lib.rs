//! View definitions and the masking engine.
//!
//! A view is pure declarative data: a tree keyed by field name describing
//! which fields (and nested sub-views) a consumer needs from an entity.
//! Masking resolves a ref against the store into a value containing exactly
//! the declared fields, so independent call sites reading the same entity
//! can never accidentally couple through fields they did not declare.
//!
//! Views compose by field-set union ([`compose`] or
//! [`ViewBuilder::spread`]); conflicting duplicate shapes are rejected at
//! construction time, never at read time.

pub mod definition;
pub mod error;
pub mod mask;

pub use definition::{compose, FieldSelection, ListView, ResolverField, ViewBuilder, ViewDefinition};
pub use error::{ViewError, ViewResult};
pub use mask::{
    resolve_entity, resolve_keys, DependencySet, ListSource, MaskedEntity, MaskedValue, Resolved,
};
