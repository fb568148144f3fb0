use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use facet_types::{EntityKey, EntityRecord};

use crate::error::StoreResult;
use crate::signal::Invalidation;
use crate::traits::EntityReader;

/// In-memory, HashMap-based entity store.
///
/// The single owner of all normalized records. All records are held behind a
/// `RwLock`; mutations are serialized by the write lock, which gives the
/// single-writer semantics the rest of the system assumes. Records are cloned
/// on read.
pub struct EntityStore {
    records: RwLock<HashMap<EntityKey, EntityRecord>>,
}

impl EntityStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().expect("lock poisoned").is_empty()
    }

    /// Remove all records.
    pub fn clear(&self) {
        self.records.write().expect("lock poisoned").clear();
    }

    /// Return a sorted list of all keys in the store.
    pub fn all_keys(&self) -> Vec<EntityKey> {
        let map = self.records.read().expect("lock poisoned");
        let mut keys: Vec<EntityKey> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Merge a patch into the record named by `(typename, id)`.
    ///
    /// Field-wise union semantics: fields absent from the patch are kept,
    /// incoming fields win. Returns the invalidation signal naming the
    /// fields that changed.
    pub fn merge(
        &self,
        typename: &str,
        id: &str,
        patch: &EntityRecord,
    ) -> StoreResult<Invalidation> {
        let key = EntityKey::new(typename, id)?;
        Ok(self.merge_keyed(&key, patch))
    }

    /// Merge a patch into the record for an already-validated key.
    pub fn merge_keyed(&self, key: &EntityKey, patch: &EntityRecord) -> Invalidation {
        let mut map = self.records.write().expect("lock poisoned");
        let record = map.entry(key.clone()).or_default();
        let changed = record.apply(patch);
        debug!(key = %key, changed = changed.len(), "record merged");
        Invalidation::new(key.clone(), changed)
    }

    /// Remove a record. Returns `None` if the key was not present.
    ///
    /// Every field of the removed record is reported as changed, so
    /// dependents observe that the key is now dangling.
    pub fn delete(&self, key: &EntityKey) -> Option<Invalidation> {
        let mut map = self.records.write().expect("lock poisoned");
        let removed = map.remove(key)?;
        let fields: Vec<String> = removed.field_names().map(str::to_string).collect();
        debug!(key = %key, "record deleted");
        Some(Invalidation::new(key.clone(), fields))
    }

    /// Put back a previously captured snapshot, verbatim.
    ///
    /// `None` removes the record (the key did not exist when the snapshot
    /// was taken). The invalidation covers every field whose value differs
    /// between the outgoing and incoming record.
    pub fn restore(&self, key: &EntityKey, snapshot: Option<EntityRecord>) -> Invalidation {
        let mut map = self.records.write().expect("lock poisoned");
        let previous = match &snapshot {
            Some(record) => map.insert(key.clone(), record.clone()),
            None => map.remove(key),
        };
        let changed = diff_fields(previous.as_ref(), snapshot.as_ref());
        debug!(key = %key, changed = changed.len(), "record restored");
        Invalidation::new(key.clone(), changed)
    }
}

/// Field names whose value differs between two optional records.
fn diff_fields(before: Option<&EntityRecord>, after: Option<&EntityRecord>) -> Vec<String> {
    let empty = EntityRecord::new();
    let before = before.unwrap_or(&empty);
    let after = after.unwrap_or(&empty);

    let mut changed: Vec<String> = Vec::new();
    for (name, value) in before.iter() {
        if after.get(name) != Some(value) {
            changed.push(name.to_string());
        }
    }
    for (name, _) in after.iter() {
        if !before.contains(name) {
            changed.push(name.to_string());
        }
    }
    changed.sort();
    changed
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityReader for EntityStore {
    fn record(&self, key: &EntityKey) -> Option<EntityRecord> {
        let map = self.records.read().expect("lock poisoned");
        map.get(key).cloned()
    }

    fn contains(&self, key: &EntityKey) -> bool {
        let map = self.records.read().expect("lock poisoned");
        map.contains_key(key)
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("record_count", &self.len())
            .finish()
    }
}
