use facet_types::EntityKey;

/// The invalidation signal emitted by every store mutation.
///
/// Names exactly the `(key, field)` pairs whose value changed. Writing a
/// value identical to the stored one does not appear here, which is what
/// allows the subscription layer to suppress redundant recomputation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invalidation {
    key: EntityKey,
    fields: Vec<String>,
}

impl Invalidation {
    pub fn new(key: EntityKey, fields: Vec<String>) -> Self {
        Self { key, fields }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// `true` if no field actually changed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate the changed pairs as `(key, field)`.
    pub fn pairs(&self) -> impl Iterator<Item = (&EntityKey, &str)> {
        self.fields.iter().map(move |f| (&self.key, f.as_str()))
    }
}
