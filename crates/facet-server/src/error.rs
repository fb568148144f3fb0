use thiserror::Error;

use facet_types::TypeError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerError {
    /// A declared field has no backing column in the storage row.
    #[error("row for `{typename}` is missing column `{column}`")]
    MissingColumn { typename: String, column: String },

    /// A declared relation was not loaded alongside the row.
    #[error("row for `{typename}` is missing relation `{relation}`")]
    MissingRelation { typename: String, relation: String },

    /// A relation was loaded with the wrong cardinality for its selection.
    #[error("relation `{relation}` on `{typename}` has the wrong cardinality")]
    RelationShape { typename: String, relation: String },

    #[error(transparent)]
    Type(#[from] TypeError),
}

pub type ServerResult<T> = Result<T, ServerError>;
