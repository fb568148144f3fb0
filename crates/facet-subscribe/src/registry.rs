use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use facet_store::{EntityReader, Invalidation};
use facet_types::{ConnectionArgs, EntityKey, ViewRef};
use facet_view::{
    resolve_entity, resolve_keys, ListSource, MaskedValue, Resolved, ViewDefinition, ViewResult,
};

/// Identifier of one active subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub:{}", self.0)
    }
}

/// What a subscription observes: a single entity through a view, or a
/// connection's accumulated key sequence through an item view.
#[derive(Clone, Debug)]
pub enum SubscriptionTarget {
    Entity {
        view_ref: ViewRef,
        view: ViewDefinition,
    },
    Connection {
        parent: EntityKey,
        field: String,
        args: ConnectionArgs,
        item_view: ViewDefinition,
    },
}

type NotifyCallback = Arc<dyn Fn(&MaskedValue) + Send + Sync>;

struct Entry {
    id: SubscriptionId,
    target: SubscriptionTarget,
    resolved: Resolved,
    callback: NotifyCallback,
}

/// Registry of active subscriptions with dependency-set fan-out.
///
/// Entries are kept in registration order, so notifications within one
/// invalidation signal are delivered in the order consumers subscribed.
pub struct SubscriptionRegistry {
    inner: RwLock<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    entries: Vec<Entry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryState::default()),
        }
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("lock poisoned").entries.is_empty()
    }

    /// Register a subscription and compute its value immediately.
    ///
    /// The initial masked value is returned (not delivered through the
    /// callback); the dependency pairs touched while masking are recorded
    /// for fan-out.
    pub fn subscribe<R, L, F>(
        &self,
        reader: &R,
        lists: &L,
        target: SubscriptionTarget,
        callback: F,
    ) -> ViewResult<(SubscriptionId, MaskedValue)>
    where
        R: EntityReader + ?Sized,
        L: ListSource + ?Sized,
        F: Fn(&MaskedValue) + Send + Sync + 'static,
    {
        let resolved = resolve_target(reader, lists, &target)?;
        let value = resolved.value.clone();

        let mut state = self.inner.write().expect("lock poisoned");
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.entries.push(Entry {
            id,
            target,
            resolved,
            callback: Arc::new(callback),
        });
        debug!(id = %id, total = state.entries.len(), "subscription registered");
        Ok((id, value))
    }

    /// Drop every subscription at once. No callback fires again afterwards.
    pub fn clear(&self) {
        let mut state = self.inner.write().expect("lock poisoned");
        let dropped = state.entries.len();
        state.entries.clear();
        if dropped > 0 {
            debug!(dropped, "all subscriptions cleared");
        }
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    /// The callback is never invoked again after this returns.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.write().expect("lock poisoned");
        let before = state.entries.len();
        state.entries.retain(|entry| entry.id != id);
        let removed = state.entries.len() < before;
        if removed {
            debug!(id = %id, "subscription removed");
        }
        removed
    }

    /// Fan an invalidation signal out to intersecting subscriptions.
    ///
    /// Each affected subscription is re-resolved; its callback fires only
    /// when the new masked value differs structurally from the last one.
    /// Dependency sets are replaced by the re-resolve, since the fields a
    /// view touches can change as nested refs appear and disappear.
    /// Returns the number of callbacks invoked.
    pub fn fan_out<R, L>(&self, reader: &R, lists: &L, signal: &Invalidation) -> usize
    where
        R: EntityReader + ?Sized,
        L: ListSource + ?Sized,
    {
        if signal.is_empty() {
            return 0;
        }

        let mut state = self.inner.write().expect("lock poisoned");
        let mut pending: Vec<(NotifyCallback, MaskedValue)> = Vec::new();

        for entry in &mut state.entries {
            let affected = signal.pairs().any(|(key, field)| {
                entry
                    .resolved
                    .dependencies
                    .contains(&(key.clone(), field.to_string()))
            });
            if !affected {
                continue;
            }

            match resolve_target(reader, lists, &entry.target) {
                Ok(resolved) => {
                    let changed = resolved.value != entry.resolved.value;
                    entry.resolved = resolved;
                    if changed {
                        pending.push((Arc::clone(&entry.callback), entry.resolved.value.clone()));
                    } else {
                        debug!(id = %entry.id, "notification suppressed, value unchanged");
                    }
                }
                Err(error) => {
                    warn!(id = %entry.id, %error, "subscription re-resolve failed");
                }
            }
        }
        drop(state);

        // Deliver outside the lock so a callback may subscribe/unsubscribe.
        let notified = pending.len();
        for (callback, value) in pending {
            callback(&value);
        }
        notified
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscription_count", &self.len())
            .finish()
    }
}

fn resolve_target<R, L>(
    reader: &R,
    lists: &L,
    target: &SubscriptionTarget,
) -> ViewResult<Resolved>
where
    R: EntityReader + ?Sized,
    L: ListSource + ?Sized,
{
    match target {
        SubscriptionTarget::Entity { view_ref, view } => {
            resolve_entity(reader, lists, view_ref, view)
        }
        SubscriptionTarget::Connection {
            parent,
            field,
            args,
            item_view,
        } => {
            let mut resolved = match lists.connection_keys(parent, field, args) {
                Some(keys) => resolve_keys(reader, lists, &keys, item_view)?,
                None => Resolved {
                    value: MaskedValue::Absent,
                    dependencies: Default::default(),
                },
            };
            // The key sequence itself is a dependency: appending a page
            // invalidates (parent, field).
            resolved
                .dependencies
                .insert((parent.clone(), field.clone()));
            Ok(resolved)
        }
    }
}
