//! View-to-storage projection.
//!
//! Derives, from a view definition, the minimal set of columns and relations
//! storage must produce: declared scalars, the backing columns of resolver
//! fields, and one nested projection per relation. Nothing a view did not
//! declare ever reaches the query, so adding a resolver field costs exactly
//! its backing columns.

use std::collections::{BTreeMap, BTreeSet};

use facet_view::{FieldSelection, ViewDefinition};

/// The minimal storage requirements of one view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageProjection {
    typename: String,
    columns: BTreeSet<String>,
    relations: BTreeMap<String, StorageProjection>,
}

impl StorageProjection {
    pub fn typename(&self) -> &str {
        &self.typename
    }

    /// Columns to select for this entity type, sorted.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Nested projections, one per declared relation field.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &StorageProjection)> {
        self.relations.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn relation(&self, field: &str) -> Option<&StorageProjection> {
        self.relations.get(field)
    }
}

/// Project a view into its storage requirements.
pub fn project(view: &ViewDefinition) -> StorageProjection {
    let mut columns = BTreeSet::new();
    let mut relations = BTreeMap::new();

    for (field, selection) in view.fields() {
        match selection {
            FieldSelection::Scalar => {
                columns.insert(field.to_string());
            }
            FieldSelection::Resolver(resolver) => {
                // The resolver's own name is not a column; only its backing
                // fields are fetched.
                for backing in resolver.depends_on() {
                    columns.insert(backing.clone());
                }
            }
            FieldSelection::Nested(sub) => {
                relations.insert(field.to_string(), project(sub));
            }
            FieldSelection::List(list) => {
                relations.insert(field.to_string(), project(&list.view));
            }
        }
    }

    StorageProjection {
        typename: view.typename().to_string(),
        columns,
        relations,
    }
}
