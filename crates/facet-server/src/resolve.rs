//! Row-to-payload resolution.
//!
//! Turns storage rows into the tagged fragment tree the client consumes.
//! Only fields the view declared appear in the output; resolver fields are
//! computed here, server-side, from their backing columns, so the wire
//! carries the computed value and never the raw columns behind it.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::trace;

use facet_types::{
    ConnectionPage, EntityFragment, EntityRecord, FieldValue, PageInfo, Payload,
};
use facet_view::{FieldSelection, ViewDefinition};

use crate::error::{ServerError, ServerResult};

/// One row produced by storage, with its pre-loaded relations.
#[derive(Clone, Debug, Default)]
pub struct StorageRow {
    pub id: String,
    pub columns: BTreeMap<String, Value>,
    pub relations: BTreeMap<String, RowRelation>,
}

impl StorageRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            columns: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(name.into(), value.into());
        self
    }

    pub fn with_one(mut self, name: impl Into<String>, row: StorageRow) -> Self {
        self.relations.insert(name.into(), RowRelation::One(row));
        self
    }

    pub fn with_many(
        mut self,
        name: impl Into<String>,
        rows: Vec<StorageRow>,
        page_info: PageInfo,
    ) -> Self {
        self.relations
            .insert(name.into(), RowRelation::Many { rows, page_info });
        self
    }
}

/// A loaded relation: one row or a page of rows.
#[derive(Clone, Debug)]
pub enum RowRelation {
    One(StorageRow),
    Many {
        rows: Vec<StorageRow>,
        page_info: PageInfo,
    },
}

/// Resolve one row through a view into an entity fragment.
///
/// Declared scalars are copied, resolver fields computed, relations resolved
/// recursively. Columns the view did not declare are dropped, never sent.
pub fn resolve_row(view: &ViewDefinition, row: &StorageRow) -> ServerResult<EntityFragment> {
    let mut fragment = EntityFragment::new(view.typename(), row.id.clone());
    trace!(typename = view.typename(), id = %row.id, "resolving row");

    for (field, selection) in view.fields() {
        match selection {
            FieldSelection::Scalar => {
                let value = row.columns.get(field).ok_or_else(|| {
                    ServerError::MissingColumn {
                        typename: view.typename().to_string(),
                        column: field.to_string(),
                    }
                })?;
                fragment = fragment.with_scalar(field, value.clone());
            }
            FieldSelection::Resolver(resolver) => {
                let mut backing = EntityRecord::new();
                for column in resolver.depends_on() {
                    let value = row.columns.get(column).ok_or_else(|| {
                        ServerError::MissingColumn {
                            typename: view.typename().to_string(),
                            column: column.clone(),
                        }
                    })?;
                    backing.set(column.clone(), FieldValue::Scalar(value.clone()));
                }
                fragment = fragment.with_scalar(field, resolver.compute(&backing));
            }
            FieldSelection::Nested(sub) => {
                match row.relations.get(field) {
                    Some(RowRelation::One(child)) => {
                        fragment = fragment.with_entity(field, resolve_row(sub, child)?);
                    }
                    Some(RowRelation::Many { .. }) => {
                        return Err(ServerError::RelationShape {
                            typename: view.typename().to_string(),
                            relation: field.to_string(),
                        });
                    }
                    None => {
                        return Err(ServerError::MissingRelation {
                            typename: view.typename().to_string(),
                            relation: field.to_string(),
                        });
                    }
                }
            }
            FieldSelection::List(list) => match row.relations.get(field) {
                Some(RowRelation::Many { rows, page_info }) => {
                    let items = rows
                        .iter()
                        .map(|child| resolve_row(&list.view, child))
                        .collect::<ServerResult<Vec<_>>>()?;
                    fragment =
                        fragment.with_page(field, ConnectionPage::new(items, page_info.clone()));
                }
                Some(RowRelation::One(_)) => {
                    return Err(ServerError::RelationShape {
                        typename: view.typename().to_string(),
                        relation: field.to_string(),
                    });
                }
                None => {
                    return Err(ServerError::MissingRelation {
                        typename: view.typename().to_string(),
                        relation: field.to_string(),
                    });
                }
            },
        }
    }
    Ok(fragment)
}

/// Assemble a root page payload from resolved fragments.
pub fn build_page(items: Vec<EntityFragment>, page_info: PageInfo) -> Payload {
    Payload::Page(ConnectionPage::new(items, page_info))
}
