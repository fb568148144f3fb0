use std::sync::{Arc, Weak};

use crate::registry::{SubscriptionId, SubscriptionRegistry};

/// RAII guard for one subscription.
///
/// Dropping the handle unsubscribes, so a consumer that goes away cannot
/// leak a callback into the registry. Holds the registry weakly: if the
/// whole client is torn down first, drop is a no-op.
#[derive(Debug)]
pub struct SubscriptionHandle {
    registry: Weak<SubscriptionRegistry>,
    id: SubscriptionId,
    active: bool,
}

impl SubscriptionHandle {
    pub fn new(registry: &Arc<SubscriptionRegistry>, id: SubscriptionId) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            id,
            active: true,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Detach now instead of at drop. Returns `true` if the subscription
    /// was still registered.
    pub fn unsubscribe(mut self) -> bool {
        self.active = false;
        match self.registry.upgrade() {
            Some(registry) => registry.unsubscribe(self.id),
            None => false,
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}
