//! Payload normalization.
//!
//! Flattens the tree of tagged fragments a transport returns into per-entity
//! patches the store can merge, converting nested fragments into `Ref` and
//! `RefList` fields. Connection fields are not stored on the parent record;
//! they become page entries for the connection manager, keyed by the parent
//! and field that produced them.

use facet_types::{
    EntityFragment, EntityKey, EntityRecord, FieldValue, PageInfo, Payload, PayloadValue,
    TypeError,
};

/// One page of keys destined for the connection manager.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedPage {
    pub parent: EntityKey,
    pub field: String,
    pub keys: Vec<EntityKey>,
    pub page_info: PageInfo,
}

/// The flat form of one payload tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Normalized {
    /// Key of the root fragment, when the payload had one.
    pub root: Option<EntityKey>,
    /// Per-entity patches in discovery order (parents before children).
    pub patches: Vec<(EntityKey, EntityRecord)>,
    /// Connection pages found anywhere in the tree.
    pub pages: Vec<NormalizedPage>,
}

/// Normalize a payload. Root-level pages are attributed to
/// `(root_parent, operation)`.
pub fn normalize(
    operation: &str,
    root_parent: &EntityKey,
    payload: &Payload,
) -> Result<Normalized, TypeError> {
    let mut out = Normalized::default();
    match payload {
        Payload::Entity(fragment) => {
            let key = flatten(fragment, &mut out)?;
            out.root = Some(key);
        }
        Payload::Page(page) => {
            let mut keys = Vec::with_capacity(page.items.len());
            for item in &page.items {
                keys.push(flatten(item, &mut out)?);
            }
            out.pages.push(NormalizedPage {
                parent: root_parent.clone(),
                field: operation.to_string(),
                keys,
                page_info: page.page_info.clone(),
            });
        }
        Payload::Empty => {}
    }
    Ok(out)
}

fn flatten(fragment: &EntityFragment, out: &mut Normalized) -> Result<EntityKey, TypeError> {
    let key = fragment.key()?;
    let mut record = EntityRecord::new();

    // Reserve this fragment's position before recursing so parents precede
    // their children in the patch list.
    let slot = out.patches.len();
    out.patches.push((key.clone(), EntityRecord::new()));

    for (name, value) in &fragment.fields {
        match value {
            PayloadValue::Scalar(scalar) => {
                record.set(name.clone(), FieldValue::Scalar(scalar.clone()));
            }
            PayloadValue::Entity(child) => {
                let child_key = flatten(child, out)?;
                record.set(name.clone(), FieldValue::Ref(child_key));
            }
            PayloadValue::EntityList(children) => {
                let mut child_keys = Vec::with_capacity(children.len());
                for child in children {
                    child_keys.push(flatten(child, out)?);
                }
                record.set(name.clone(), FieldValue::RefList(child_keys));
            }
            PayloadValue::Connection(page) => {
                let mut item_keys = Vec::with_capacity(page.items.len());
                for item in &page.items {
                    item_keys.push(flatten(item, out)?);
                }
                out.pages.push(NormalizedPage {
                    parent: key.clone(),
                    field: name.clone(),
                    keys: item_keys,
                    page_info: page.page_info.clone(),
                });
            }
        }
    }

    out.patches[slot].1 = record;
    Ok(key)
}
