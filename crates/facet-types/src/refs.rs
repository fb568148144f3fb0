//! Opaque reference handles.
//!
//! Refs decouple a consumer's declared view from the underlying entity
//! identity and pagination state. Copying a ref never copies data; resolving
//! one always goes back through the store.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityKey;
use crate::error::TypeError;

/// An opaque handle to a single entity.
///
/// A `ViewRef` carries only the entity's key. The fields a consumer can
/// observe through it are determined entirely by the view it is resolved
/// with, never by the ref itself.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewRef {
    key: EntityKey,
}

impl ViewRef {
    pub fn new(key: EntityKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }
}

impl fmt::Display for ViewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref:{}", self.key)
    }
}

/// Arguments identifying one logical paginated list.
///
/// `first` is the requested page size; `filter` carries operation-specific
/// parameters such as a search query. Two argument sets are the same logical
/// list exactly when their canonical forms are equal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionArgs {
    first: u32,
    filter: BTreeMap<String, Value>,
}

impl ConnectionArgs {
    pub fn new(first: u32) -> Result<Self, TypeError> {
        if first == 0 {
            return Err(TypeError::ZeroPageSize);
        }
        Ok(Self {
            first,
            filter: BTreeMap::new(),
        })
    }

    /// Builder-style filter parameter (e.g. a live search query).
    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(name.into(), value.into());
        self
    }

    pub fn first(&self) -> u32 {
        self.first
    }

    pub fn filter(&self) -> &BTreeMap<String, Value> {
        &self.filter
    }

    /// Canonical string form. The filter map is ordered, so equal argument
    /// sets always canonicalize identically.
    pub fn canonical(&self) -> String {
        let mut out = format!("first={}", self.first);
        for (name, value) in &self.filter {
            out.push('&');
            out.push_str(name);
            out.push('=');
            out.push_str(&value.to_string());
        }
        out
    }

    /// The argument object sent to the transport.
    pub fn to_request_args(&self, after: Option<&str>) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("first".into(), Value::from(self.first));
        for (name, value) in &self.filter {
            map.insert(name.clone(), value.clone());
        }
        if let Some(cursor) = after {
            map.insert("after".into(), Value::from(cursor));
        }
        Value::Object(map)
    }
}

/// An opaque handle to one logical paginated collection.
///
/// A `ConnectionRef` identifies the list by its producing operation and its
/// arguments. Changing the arguments (a new filter, a different page size)
/// produces a different ref and therefore a fresh, independent page sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRef {
    operation: String,
    args: ConnectionArgs,
}

impl ConnectionRef {
    pub fn new(operation: impl Into<String>, args: ConnectionArgs) -> Self {
        Self {
            operation: operation.into(),
            args,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn args(&self) -> &ConnectionArgs {
        &self.args
    }

    /// Stable identity string for this logical list.
    pub fn canonical(&self) -> String {
        format!("{}?{}", self.operation, self.args.canonical())
    }
}

impl fmt::Display for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(typename: &str, id: &str) -> EntityKey {
        EntityKey::new(typename, id).unwrap()
    }

    #[test]
    fn view_ref_is_just_a_key() {
        let r = ViewRef::new(key("Post", "1"));
        assert_eq!(r.key(), &key("Post", "1"));
        assert_eq!(r.to_string(), "ref:Post:1");
    }

    #[test]
    fn copied_refs_are_equal() {
        let r = ViewRef::new(key("Post", "1"));
        let copy = r.clone();
        assert_eq!(r, copy);
    }

    #[test]
    fn args_reject_zero_page_size() {
        assert_eq!(ConnectionArgs::new(0), Err(TypeError::ZeroPageSize));
    }

    #[test]
    fn canonical_is_stable_across_filter_insertion_order() {
        let a = ConnectionArgs::new(3)
            .unwrap()
            .with_filter("query", "rust")
            .with_filter("author", "ada");
        let b = ConnectionArgs::new(3)
            .unwrap()
            .with_filter("author", "ada")
            .with_filter("query", "rust");
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn different_filters_canonicalize_differently() {
        let a = ConnectionArgs::new(3).unwrap().with_filter("query", "rust");
        let b = ConnectionArgs::new(3).unwrap().with_filter("query", "zig");
        assert_ne!(a.canonical(), b.canonical());
    }

    #[test]
    fn request_args_include_cursor_when_present() {
        let args = ConnectionArgs::new(2).unwrap().with_filter("query", "hi");
        let value = args.to_request_args(Some("cursor-7"));
        assert_eq!(value["first"], Value::from(2));
        assert_eq!(value["query"], Value::from("hi"));
        assert_eq!(value["after"], Value::from("cursor-7"));

        let without = args.to_request_args(None);
        assert!(without.get("after").is_none());
    }

    #[test]
    fn connection_ref_identity() {
        let args = ConnectionArgs::new(3).unwrap();
        let a = ConnectionRef::new("posts", args.clone());
        let b = ConnectionRef::new("posts", args);
        assert_eq!(a, b);
        assert_eq!(a.canonical(), "posts?first=3");
    }
}
