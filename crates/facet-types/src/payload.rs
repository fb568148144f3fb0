//! Transport payload shapes.
//!
//! A transport resolves an operation into a tree of entity fragments, each
//! tagged with its `(typename, id)`. List payloads additionally carry page
//! information. The client normalizes this tree into flat store records; the
//! server counterpart produces it from storage rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityKey;
use crate::error::TypeError;

/// Pagination state attached to a list payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Whether the server holds more items past this page.
    pub has_next: bool,
    /// Opaque continuation cursor for the next page request.
    pub end_cursor: Option<String>,
}

/// One entity in a payload tree: its identity plus the requested fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityFragment {
    pub typename: String,
    pub id: String,
    pub fields: BTreeMap<String, PayloadValue>,
}

impl EntityFragment {
    pub fn new(typename: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            typename: typename.into(),
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_scalar(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .insert(name.into(), PayloadValue::Scalar(value.into()));
        self
    }

    pub fn with_entity(mut self, name: impl Into<String>, fragment: EntityFragment) -> Self {
        self.fields
            .insert(name.into(), PayloadValue::Entity(fragment));
        self
    }

    pub fn with_entity_list(
        mut self,
        name: impl Into<String>,
        fragments: Vec<EntityFragment>,
    ) -> Self {
        self.fields
            .insert(name.into(), PayloadValue::EntityList(fragments));
        self
    }

    pub fn with_page(mut self, name: impl Into<String>, page: ConnectionPage) -> Self {
        self.fields
            .insert(name.into(), PayloadValue::Connection(page));
        self
    }

    /// The normalized identity of this fragment.
    pub fn key(&self) -> Result<EntityKey, TypeError> {
        EntityKey::new(self.typename.clone(), self.id.clone())
    }
}

/// One field value inside a fragment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PayloadValue {
    Scalar(Value),
    Entity(EntityFragment),
    EntityList(Vec<EntityFragment>),
    Connection(ConnectionPage),
}

/// One page of a paginated collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPage {
    pub items: Vec<EntityFragment>,
    pub page_info: PageInfo,
}

impl ConnectionPage {
    pub fn new(items: Vec<EntityFragment>, page_info: PageInfo) -> Self {
        Self { items, page_info }
    }
}

/// The full response to one operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// A single root entity.
    Entity(EntityFragment),
    /// A page of a paginated collection.
    Page(ConnectionPage),
    /// The operation resolved to nothing (e.g. no signed-in viewer).
    Empty,
}
