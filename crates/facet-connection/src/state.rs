use std::collections::HashSet;

use facet_types::{EntityKey, PageInfo};

/// Lifecycle of one logical list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No page loaded yet.
    Empty,
    /// A complete response arrived and advertised nothing further.
    Loaded,
    /// Pages are held and the most recent response declared more available.
    LoadedWithMore,
    /// Pagination ran to the end of the list.
    Exhausted,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loaded => "loaded",
            Self::LoadedWithMore => "loaded-with-more",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Accumulated page state for one logical list.
///
/// The key sequence is append-only: a new page extends it, never replaces
/// it. Order is the server-returned sequence; duplicate keys across pages
/// keep their first-seen position.
#[derive(Clone, Debug)]
pub struct ConnectionState {
    status: ConnectionStatus,
    keys: Vec<EntityKey>,
    seen: HashSet<EntityKey>,
    end_cursor: Option<String>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Empty,
            keys: Vec::new(),
            seen: HashSet::new(),
            end_cursor: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn keys(&self) -> &[EntityKey] {
        &self.keys
    }

    pub fn end_cursor(&self) -> Option<&str> {
        self.end_cursor.as_deref()
    }

    /// `true` when the most recent page declared more data available.
    pub fn can_load_next(&self) -> bool {
        self.status == ConnectionStatus::LoadedWithMore
    }

    /// Append one page. Returns `true` if the key sequence changed.
    pub fn ingest(&mut self, page_keys: Vec<EntityKey>, page_info: &PageInfo) -> bool {
        let mut changed = false;
        for key in page_keys {
            if self.seen.insert(key.clone()) {
                self.keys.push(key);
                changed = true;
            }
        }

        self.end_cursor = page_info.end_cursor.clone();
        self.status = if page_info.has_next {
            ConnectionStatus::LoadedWithMore
        } else if self.status == ConnectionStatus::Empty {
            ConnectionStatus::Loaded
        } else {
            ConnectionStatus::Exhausted
        };

        changed
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
