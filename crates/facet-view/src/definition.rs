use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use facet_types::{ConnectionArgs, EntityRecord};

use crate::error::{ViewError, ViewResult};

/// A named computed field: declared backing fields plus a pure computation
/// over the stored record.
///
/// The backing fields are what the server projects from storage and what the
/// client records as dependencies; the computation itself never touches
/// anything it did not declare.
#[derive(Clone)]
pub struct ResolverField {
    depends_on: Vec<String>,
    compute: Arc<dyn Fn(&EntityRecord) -> Value + Send + Sync>,
}

impl ResolverField {
    pub fn new<I, S, F>(depends_on: I, compute: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&EntityRecord) -> Value + Send + Sync + 'static,
    {
        Self {
            depends_on: depends_on.into_iter().map(Into::into).collect(),
            compute: Arc::new(compute),
        }
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn compute(&self, record: &EntityRecord) -> Value {
        (self.compute)(record)
    }
}

impl fmt::Debug for ResolverField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverField")
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ResolverField {
    fn eq(&self, other: &Self) -> bool {
        // Two resolver declarations are the same shape only if they share
        // the computation itself, not just its dependency list.
        self.depends_on == other.depends_on && Arc::ptr_eq(&self.compute, &other.compute)
    }
}

/// A paginated sub-selection: an item view plus the pagination arguments
/// identifying the logical list at this call site.
#[derive(Clone, Debug, PartialEq)]
pub struct ListView {
    pub view: ViewDefinition,
    pub args: ConnectionArgs,
}

/// One entry in a view: the shape requested for a single field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldSelection {
    /// A scalar field, copied as-is.
    Scalar,
    /// A relation resolved through a nested view (single ref or ref list).
    Nested(ViewDefinition),
    /// A paginated connection with its own page state.
    List(ListView),
    /// A computed field backed by other stored fields.
    Resolver(ResolverField),
}

impl FieldSelection {
    fn kind(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Nested(_) => "nested",
            Self::List(_) => "list",
            Self::Resolver(_) => "resolver",
        }
    }
}

/// A declarative field selection over one entity type.
///
/// Views are pure data, cheap to clone, and composable: spreading one view
/// into another unions their field sets.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewDefinition {
    typename: String,
    fields: BTreeMap<String, FieldSelection>,
}

impl ViewDefinition {
    pub fn builder(typename: impl Into<String>) -> ViewBuilder {
        ViewBuilder {
            typename: typename.into(),
            entries: Vec::new(),
        }
    }

    pub fn typename(&self) -> &str {
        &self.typename
    }

    pub fn selection(&self, field: &str) -> Option<&FieldSelection> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSelection)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Construction-time builder with conflict validation.
pub struct ViewBuilder {
    typename: String,
    entries: Vec<(String, FieldSelection)>,
}

impl ViewBuilder {
    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.entries.push((name.into(), FieldSelection::Scalar));
        self
    }

    pub fn nested(mut self, name: impl Into<String>, view: ViewDefinition) -> Self {
        self.entries.push((name.into(), FieldSelection::Nested(view)));
        self
    }

    pub fn list(
        mut self,
        name: impl Into<String>,
        view: ViewDefinition,
        args: ConnectionArgs,
    ) -> Self {
        self.entries
            .push((name.into(), FieldSelection::List(ListView { view, args })));
        self
    }

    pub fn resolver(mut self, name: impl Into<String>, resolver: ResolverField) -> Self {
        self.entries
            .push((name.into(), FieldSelection::Resolver(resolver)));
        self
    }

    /// Spread every field of another view into this one (field-set union).
    pub fn spread(mut self, view: &ViewDefinition) -> Self {
        for (name, selection) in view.fields() {
            self.entries.push((name.to_string(), selection.clone()));
        }
        self
    }

    /// Validate and build. Duplicate declarations are unioned when their
    /// shapes are compatible and rejected otherwise.
    pub fn build(self) -> ViewResult<ViewDefinition> {
        let mut fields: BTreeMap<String, FieldSelection> = BTreeMap::new();
        for (name, selection) in self.entries {
            match fields.remove(&name) {
                None => {
                    fields.insert(name, selection);
                }
                Some(existing) => {
                    let merged = merge_selection(&name, existing, selection)?;
                    fields.insert(name, merged);
                }
            }
        }
        Ok(ViewDefinition {
            typename: self.typename,
            fields,
        })
    }
}

/// Compose two views over the same typename by field-set union.
pub fn compose(base: &ViewDefinition, extension: &ViewDefinition) -> ViewResult<ViewDefinition> {
    if base.typename != extension.typename {
        return Err(ViewError::TypeMismatch {
            expected: base.typename.clone(),
            actual: extension.typename.clone(),
        });
    }
    ViewDefinition::builder(base.typename.clone())
        .spread(base)
        .spread(extension)
        .build()
}

/// Union two declarations of the same field, or reject them.
fn merge_selection(
    name: &str,
    a: FieldSelection,
    b: FieldSelection,
) -> ViewResult<FieldSelection> {
    match (a, b) {
        (FieldSelection::Scalar, FieldSelection::Scalar) => Ok(FieldSelection::Scalar),
        (FieldSelection::Nested(a), FieldSelection::Nested(b)) => {
            if a.typename != b.typename {
                return Err(ViewError::ShapeConflict {
                    field: name.to_string(),
                    reason: format!(
                        "nested views over different types `{}` and `{}`",
                        a.typename, b.typename
                    ),
                });
            }
            Ok(FieldSelection::Nested(compose(&a, &b)?))
        }
        (FieldSelection::List(a), FieldSelection::List(b)) => {
            if a.args != b.args {
                return Err(ViewError::ShapeConflict {
                    field: name.to_string(),
                    reason: "list selections with different pagination args".into(),
                });
            }
            Ok(FieldSelection::List(ListView {
                view: compose(&a.view, &b.view)?,
                args: a.args,
            }))
        }
        (FieldSelection::Resolver(a), FieldSelection::Resolver(b)) => {
            if a != b {
                return Err(ViewError::ShapeConflict {
                    field: name.to_string(),
                    reason: "different resolver declarations".into(),
                });
            }
            Ok(FieldSelection::Resolver(a))
        }
        (a, b) => Err(ViewError::ShapeConflict {
            field: name.to_string(),
            reason: format!("{} vs {}", a.kind(), b.kind()),
        }),
    }
}
