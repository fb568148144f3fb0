use thiserror::Error;

/// Definition-time and masking errors.
///
/// These are development errors: a view that conflicts with itself or is
/// applied to the wrong entity type fails loudly rather than silently
/// producing absent fields.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    /// The same field was declared twice with incompatible shapes.
    #[error("conflicting shapes for field `{field}`: {reason}")]
    ShapeConflict { field: String, reason: String },

    /// A view for one typename was applied to a ref of another.
    #[error("view over `{expected}` applied to entity of type `{actual}`")]
    TypeMismatch { expected: String, actual: String },
}

/// Result alias for view operations.
pub type ViewResult<T> = Result<T, ViewError>;
