use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::trace;

use facet_store::EntityReader;
use facet_types::{ConnectionArgs, EntityKey, ViewRef};

use crate::definition::{FieldSelection, ViewDefinition};
use crate::error::{ViewError, ViewResult};

/// The `(key, field)` pairs touched while masking one value.
///
/// Recorded on every resolve and recomputed every time, since which fields
/// are actually touched can change as nested refs appear and disappear.
pub type DependencySet = BTreeSet<(EntityKey, String)>;

/// Source of ordered keys for paginated list fields.
///
/// Implemented by the connection manager. Returns `None` when no page has
/// been loaded for the given call site yet.
pub trait ListSource {
    fn connection_keys(
        &self,
        parent: &EntityKey,
        field: &str,
        args: &ConnectionArgs,
    ) -> Option<Vec<EntityKey>>;
}

/// A list source with no connections; useful where a view has no list
/// fields, and in tests.
impl ListSource for () {
    fn connection_keys(&self, _: &EntityKey, _: &str, _: &ConnectionArgs) -> Option<Vec<EntityKey>> {
        None
    }
}

/// A masked field-limited value: exactly what the view declared, nothing
/// else. Structural equality is what the subscription layer compares to
/// suppress redundant notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum MaskedValue {
    Scalar(Value),
    Entity(MaskedEntity),
    List(Vec<MaskedValue>),
    /// The underlying data is missing: a dangling ref, an unfetched field,
    /// or a connection with no loaded page. Callers decide whether to
    /// suspend or render a placeholder.
    Absent,
}

impl MaskedValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_entity(&self) -> Option<&MaskedEntity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MaskedValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }
}

/// One masked entity: its key plus the declared fields.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskedEntity {
    key: EntityKey,
    fields: BTreeMap<String, MaskedValue>,
}

impl MaskedEntity {
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn get(&self, field: &str) -> Option<&MaskedValue> {
        self.fields.get(field)
    }

    pub fn scalar(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).and_then(MaskedValue::as_scalar)
    }

    pub fn entity(&self, field: &str) -> Option<&MaskedEntity> {
        self.fields.get(field).and_then(MaskedValue::as_entity)
    }

    pub fn list(&self, field: &str) -> Option<&[MaskedValue]> {
        self.fields.get(field).and_then(MaskedValue::as_list)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// The outcome of masking: the value plus the dependency set touched.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    pub value: MaskedValue,
    pub dependencies: DependencySet,
}

/// Resolve a single-entity ref against the store through a view.
///
/// Applying a view to a ref of a different typename is a definition-time
/// error; a missing record is not, and resolves to [`MaskedValue::Absent`].
pub fn resolve_entity<R, L>(
    reader: &R,
    lists: &L,
    view_ref: &ViewRef,
    view: &ViewDefinition,
) -> ViewResult<Resolved>
where
    R: EntityReader + ?Sized,
    L: ListSource + ?Sized,
{
    if view_ref.key().typename() != view.typename() {
        return Err(ViewError::TypeMismatch {
            expected: view.typename().to_string(),
            actual: view_ref.key().typename().to_string(),
        });
    }

    let mut dependencies = DependencySet::new();
    let value = mask_entity(reader, lists, view_ref.key(), view, &mut dependencies)?;
    trace!(key = %view_ref.key(), deps = dependencies.len(), "entity resolved");
    Ok(Resolved {
        value,
        dependencies,
    })
}

/// Resolve an ordered key sequence (a connection's accumulated pages)
/// through an item view. Entities whose key cannot be found are omitted.
pub fn resolve_keys<R, L>(
    reader: &R,
    lists: &L,
    keys: &[EntityKey],
    item_view: &ViewDefinition,
) -> ViewResult<Resolved>
where
    R: EntityReader + ?Sized,
    L: ListSource + ?Sized,
{
    let mut dependencies = DependencySet::new();
    let mut items = Vec::with_capacity(keys.len());
    for key in keys {
        let masked = mask_entity(reader, lists, key, item_view, &mut dependencies)?;
        if !masked.is_absent() {
            items.push(masked);
        }
    }
    Ok(Resolved {
        value: MaskedValue::List(items),
        dependencies,
    })
}

fn mask_entity<R, L>(
    reader: &R,
    lists: &L,
    key: &EntityKey,
    view: &ViewDefinition,
    deps: &mut DependencySet,
) -> ViewResult<MaskedValue>
where
    R: EntityReader + ?Sized,
    L: ListSource + ?Sized,
{
    let Some(record) = reader.record(key) else {
        // Dangling or not-yet-fetched: register the declared leaves so a
        // later arrival of this entity recomputes the value.
        record_declared_leaves(key, view, deps);
        return Ok(MaskedValue::Absent);
    };

    let mut fields = BTreeMap::new();
    for (name, selection) in view.fields() {
        let value = match selection {
            FieldSelection::Scalar => {
                deps.insert((key.clone(), name.to_string()));
                match record.get(name) {
                    Some(stored) => match stored.as_scalar() {
                        Some(scalar) => MaskedValue::Scalar(scalar.clone()),
                        None => {
                            return Err(ViewError::ShapeConflict {
                                field: name.to_string(),
                                reason: "stored value is a reference, not a scalar".into(),
                            })
                        }
                    },
                    None => MaskedValue::Absent,
                }
            }
            FieldSelection::Nested(sub_view) => {
                deps.insert((key.clone(), name.to_string()));
                match record.get(name) {
                    Some(stored) => {
                        if let Some(target) = stored.as_ref_key() {
                            mask_nested(reader, lists, target, sub_view, name, deps)?
                        } else if let Some(targets) = stored.as_ref_list() {
                            let mut items = Vec::with_capacity(targets.len());
                            for target in targets {
                                let masked =
                                    mask_nested(reader, lists, target, sub_view, name, deps)?;
                                if !masked.is_absent() {
                                    items.push(masked);
                                }
                            }
                            MaskedValue::List(items)
                        } else {
                            return Err(ViewError::ShapeConflict {
                                field: name.to_string(),
                                reason: "stored value is a scalar, not a reference".into(),
                            });
                        }
                    }
                    None => MaskedValue::Absent,
                }
            }
            FieldSelection::List(list_view) => {
                deps.insert((key.clone(), name.to_string()));
                match lists.connection_keys(key, name, &list_view.args) {
                    Some(keys) => {
                        let mut items = Vec::with_capacity(keys.len());
                        for item_key in &keys {
                            let masked =
                                mask_entity(reader, lists, item_key, &list_view.view, deps)?;
                            if !masked.is_absent() {
                                items.push(masked);
                            }
                        }
                        MaskedValue::List(items)
                    }
                    None => MaskedValue::Absent,
                }
            }
            FieldSelection::Resolver(resolver) => {
                for backing in resolver.depends_on() {
                    deps.insert((key.clone(), backing.clone()));
                }
                let all_present = resolver.depends_on().iter().all(|b| record.contains(b));
                if all_present {
                    MaskedValue::Scalar(resolver.compute(&record))
                } else {
                    MaskedValue::Absent
                }
            }
        };
        fields.insert(name.to_string(), value);
    }

    Ok(MaskedValue::Entity(MaskedEntity {
        key: key.clone(),
        fields,
    }))
}

fn mask_nested<R, L>(
    reader: &R,
    lists: &L,
    target: &EntityKey,
    sub_view: &ViewDefinition,
    field: &str,
    deps: &mut DependencySet,
) -> ViewResult<MaskedValue>
where
    R: EntityReader + ?Sized,
    L: ListSource + ?Sized,
{
    if target.typename() != sub_view.typename() {
        return Err(ViewError::ShapeConflict {
            field: field.to_string(),
            reason: format!(
                "reference to `{}` where the view declares `{}`",
                target.typename(),
                sub_view.typename()
            ),
        });
    }
    mask_entity(reader, lists, target, sub_view, deps)
}

/// Register the fields a view would touch on an entity that is not present.
fn record_declared_leaves(key: &EntityKey, view: &ViewDefinition, deps: &mut DependencySet) {
    for (name, selection) in view.fields() {
        match selection {
            FieldSelection::Resolver(resolver) => {
                for backing in resolver.depends_on() {
                    deps.insert((key.clone(), backing.clone()));
                }
            }
            _ => {
                deps.insert((key.clone(), name.to_string()));
            }
        }
    }
}
