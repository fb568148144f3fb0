use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// Globally unique identity of a normalized entity record.
///
/// An `EntityKey` is a `(typename, id)` pair. Two payload fragments carrying
/// the same key always describe the same entity, which is what lets the cache
/// update one record and have the change reflected everywhere it is
/// referenced.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    typename: String,
    id: String,
}

impl EntityKey {
    /// Create a key from a typename and an id. Both must be non-empty.
    pub fn new(typename: impl Into<String>, id: impl Into<String>) -> Result<Self, TypeError> {
        let typename = typename.into();
        let id = id.into();
        if typename.is_empty() {
            return Err(TypeError::EmptyTypename);
        }
        if id.is_empty() {
            return Err(TypeError::EmptyId(typename));
        }
        Ok(Self { typename, id })
    }

    /// The entity's type name (e.g. "Post").
    pub fn typename(&self) -> &str {
        &self.typename
    }

    /// The entity's id within its type.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({}:{})", self.typename, self.id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.typename, self.id)
    }
}

/// One stored field of an entity record.
///
/// Relational fields hold [`EntityKey`] references rather than inline data;
/// following a reference always goes back through the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// A scalar payload value (string, number, bool, null, or JSON shape).
    Scalar(Value),
    /// A reference to a single entity.
    Ref(EntityKey),
    /// An ordered list of entity references.
    RefList(Vec<EntityKey>),
}

impl FieldValue {
    /// Convenience constructor for scalar values.
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::Scalar(value.into())
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ref_key(&self) -> Option<&EntityKey> {
        match self {
            Self::Ref(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_ref_list(&self) -> Option<&[EntityKey]> {
        match self {
            Self::RefList(keys) => Some(keys),
            _ => None,
        }
    }
}

/// A normalized entity record: a map from field name to value.
///
/// Records are exclusively owned by the entity store. Field identity is by
/// name; there are no ordering constraints beyond the map's deterministic
/// iteration order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl EntityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion, for patch construction.
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merge a patch into this record, field-wise.
    ///
    /// Union semantics: fields absent from the patch are kept, fields present
    /// in the patch win. Returns the names of fields whose value actually
    /// changed; writing an identical value is not a change.
    pub fn apply(&mut self, patch: &EntityRecord) -> Vec<String> {
        let mut changed = Vec::new();
        for (name, incoming) in &patch.fields {
            match self.fields.get(name) {
                Some(existing) if existing == incoming => {}
                _ => {
                    self.fields.insert(name.clone(), incoming.clone());
                    changed.push(name.clone());
                }
            }
        }
        changed
    }
}

impl FromIterator<(String, FieldValue)> for EntityRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
