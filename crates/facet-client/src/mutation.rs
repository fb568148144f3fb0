//! Optimistic mutation journal.
//!
//! Every optimistic mutation snapshots the records it is about to touch,
//! applies its patch synchronously, and is entered into a journal in issue
//! order. On success the authoritative response is merged and the entry
//! committed; on failure the snapshots are restored verbatim and every
//! later-issued entry's effect is re-applied on top, so an early rollback
//! never silently discards a later mutation.

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use facet_store::{EntityReader, EntityStore, Invalidation};
use facet_types::{EntityKey, EntityRecord};
use facet_view::ViewDefinition;

/// One mutation to issue through the client.
#[derive(Clone, Debug)]
pub struct MutationRequest {
    pub operation: String,
    pub input: Value,
    /// Patches applied synchronously before the transport call. May target
    /// keys not yet in the store (placeholder entities).
    pub optimistic: Vec<(EntityKey, EntityRecord)>,
    /// View used to mask the response's root entity.
    pub view: Option<ViewDefinition>,
}

impl MutationRequest {
    pub fn new(operation: impl Into<String>, input: Value) -> Self {
        Self {
            operation: operation.into(),
            input,
            optimistic: Vec::new(),
            view: None,
        }
    }

    pub fn with_optimistic(mut self, key: EntityKey, patch: EntityRecord) -> Self {
        self.optimistic.push((key, patch));
        self
    }

    pub fn with_view(mut self, view: ViewDefinition) -> Self {
        self.view = Some(view);
        self
    }
}

/// Lifecycle of one journal entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MutationStatus {
    Pending,
    Committed,
    RolledBack,
}

struct JournalEntry {
    id: Uuid,
    status: MutationStatus,
    /// Pre-mutation record per touched key; `None` means the key did not
    /// exist, so rollback removes it.
    snapshots: Vec<(EntityKey, Option<EntityRecord>)>,
    optimistic: Vec<(EntityKey, EntityRecord)>,
    /// Authoritative patches, recorded at commit for replay.
    authoritative: Vec<(EntityKey, EntityRecord)>,
}

/// Issue-ordered journal of in-flight and recently settled mutations.
///
/// Settled entries are retained while any earlier entry is still pending,
/// because rolling that earlier entry back must replay them.
#[derive(Default)]
pub(crate) struct OptimisticJournal {
    entries: Vec<JournalEntry>,
}

impl OptimisticJournal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot and apply an optimistic patch set.
    pub(crate) fn begin(
        &mut self,
        store: &EntityStore,
        optimistic: Vec<(EntityKey, EntityRecord)>,
    ) -> (Uuid, Vec<Invalidation>) {
        let id = Uuid::now_v7();
        let snapshots: Vec<_> = optimistic
            .iter()
            .map(|(key, _)| (key.clone(), store.record(key)))
            .collect();
        let signals: Vec<_> = optimistic
            .iter()
            .map(|(key, patch)| store.merge_keyed(key, patch))
            .collect();

        debug!(mutation = %id, keys = optimistic.len(), "optimistic patch applied");
        self.entries.push(JournalEntry {
            id,
            status: MutationStatus::Pending,
            snapshots,
            optimistic,
            authoritative: Vec::new(),
        });
        (id, signals)
    }

    /// Merge the authoritative patches and settle the entry as committed.
    pub(crate) fn commit(
        &mut self,
        store: &EntityStore,
        id: Uuid,
        authoritative: Vec<(EntityKey, EntityRecord)>,
    ) -> Vec<Invalidation> {
        let signals: Vec<_> = authoritative
            .iter()
            .map(|(key, patch)| store.merge_keyed(key, patch))
            .collect();

        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.authoritative = authoritative;
            entry.status = MutationStatus::Committed;
            debug!(mutation = %id, "mutation committed");
        }
        self.prune();
        signals
    }

    /// Restore the entry's snapshots verbatim, then re-apply every
    /// later-issued entry's effect in issue order.
    pub(crate) fn rollback(&mut self, store: &EntityStore, id: Uuid) -> Vec<Invalidation> {
        let Some(index) = self.entries.iter().position(|e| e.id == id) else {
            return Vec::new();
        };

        let mut signals = Vec::new();
        let snapshots = std::mem::take(&mut self.entries[index].snapshots);
        for (key, snapshot) in snapshots {
            signals.push(store.restore(&key, snapshot));
        }
        self.entries[index].status = MutationStatus::RolledBack;
        warn!(mutation = %id, "mutation rolled back");

        for entry in &self.entries[index + 1..] {
            let replay = match entry.status {
                MutationStatus::Pending => &entry.optimistic,
                MutationStatus::Committed => &entry.authoritative,
                MutationStatus::RolledBack => continue,
            };
            for (key, patch) in replay {
                signals.push(store.merge_keyed(key, patch));
            }
        }
        self.prune();
        signals
    }

    /// Drop settled entries from the front; they can no longer be replayed
    /// by any earlier rollback.
    fn prune(&mut self) {
        let keep_from = self
            .entries
            .iter()
            .position(|e| e.status == MutationStatus::Pending)
            .unwrap_or(self.entries.len());
        self.entries.drain(..keep_from);
    }
}
