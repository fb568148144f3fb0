use facet_types::{EntityKey, EntityRecord};

/// Read boundary over normalized entity records.
///
/// All implementations must satisfy these invariants:
/// - A missing key reads as `None`; reading never fails.
/// - Returned records are snapshots; mutating them does not touch the store.
/// - Concurrent reads are always safe.
pub trait EntityReader: Send + Sync {
    /// Read a record by key. Returns `None` if the key is not present.
    fn record(&self, key: &EntityKey) -> Option<EntityRecord>;

    /// Check whether a record exists for the given key.
    fn contains(&self, key: &EntityKey) -> bool {
        self.record(key).is_some()
    }
}
