use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use tracing::debug;

use facet_types::{ConnectionArgs, EntityKey, PageInfo};
use facet_view::ListSource;

use crate::error::{ConnectionError, ConnectionResult};
use crate::state::{ConnectionState, ConnectionStatus};

/// The call site owning one logical list: the parent entity and the field
/// (or root operation) producing it.
///
/// Root-level connections use the synthetic root key as their parent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionSite {
    parent: EntityKey,
    field: String,
}

impl ConnectionSite {
    pub fn new(parent: EntityKey, field: impl Into<String>) -> Self {
        Self {
            parent,
            field: field.into(),
        }
    }

    pub fn parent(&self) -> &EntityKey {
        &self.parent
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl fmt::Display for ConnectionSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.parent, self.field)
    }
}

/// Ordered page state per logical list.
///
/// Keyed by `(site, canonical args)`: the same site queried with different
/// arguments (a new search filter, a different page size) is a distinct
/// logical list and starts a fresh, independent page sequence.
pub struct ConnectionManager {
    connections: RwLock<HashMap<(ConnectionSite, String), ConnectionState>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.connections.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().expect("lock poisoned").is_empty()
    }

    pub fn clear(&self) {
        self.connections.write().expect("lock poisoned").clear();
    }

    /// Append a fetched page to the list identified by `(site, args)`.
    /// Returns `true` if the accumulated key sequence changed.
    pub fn ingest_page(
        &self,
        site: &ConnectionSite,
        args: &ConnectionArgs,
        page_keys: Vec<EntityKey>,
        page_info: &PageInfo,
    ) -> bool {
        let mut map = self.connections.write().expect("lock poisoned");
        let state = map
            .entry((site.clone(), args.canonical()))
            .or_default();
        let changed = state.ingest(page_keys, page_info);
        debug!(
            site = %site,
            args = %args.canonical(),
            total = state.keys().len(),
            status = state.status().as_str(),
            "page ingested"
        );
        changed
    }

    /// The accumulated, de-duplicated key sequence, or `None` before the
    /// first page.
    pub fn keys(&self, site: &ConnectionSite, args: &ConnectionArgs) -> Option<Vec<EntityKey>> {
        let map = self.connections.read().expect("lock poisoned");
        map.get(&(site.clone(), args.canonical()))
            .map(|state| state.keys().to_vec())
    }

    pub fn status(&self, site: &ConnectionSite, args: &ConnectionArgs) -> ConnectionStatus {
        let map = self.connections.read().expect("lock poisoned");
        map.get(&(site.clone(), args.canonical()))
            .map(ConnectionState::status)
            .unwrap_or(ConnectionStatus::Empty)
    }

    /// `true` when the most recent page for this list declared more data.
    pub fn can_load_next(&self, site: &ConnectionSite, args: &ConnectionArgs) -> bool {
        let map = self.connections.read().expect("lock poisoned");
        map.get(&(site.clone(), args.canonical()))
            .is_some_and(ConnectionState::can_load_next)
    }

    /// The continuation cursor for the next page request.
    ///
    /// Errors when the connection is unknown, already complete, or the
    /// server declared more data without supplying a cursor.
    pub fn next_cursor(
        &self,
        site: &ConnectionSite,
        args: &ConnectionArgs,
    ) -> ConnectionResult<String> {
        let map = self.connections.read().expect("lock poisoned");
        let state = map
            .get(&(site.clone(), args.canonical()))
            .ok_or_else(|| ConnectionError::UnknownConnection(site.to_string()))?;
        if !state.can_load_next() {
            return Err(ConnectionError::NoMorePages(site.to_string()));
        }
        state
            .end_cursor()
            .map(str::to_string)
            .ok_or_else(|| ConnectionError::MissingCursor(site.to_string()))
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ListSource for ConnectionManager {
    fn connection_keys(
        &self,
        parent: &EntityKey,
        field: &str,
        args: &ConnectionArgs,
    ) -> Option<Vec<EntityKey>> {
        self.keys(&ConnectionSite::new(parent.clone(), field), args)
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connection_count", &self.len())
            .finish()
    }
}
