//! Server-side counterpart for facet.
//!
//! The same view definitions the client masks with drive the server's work:
//! a view projects into the minimal columns and relations storage must
//! produce, and rows resolve back into the tagged fragment tree the client
//! normalizes. Resolver fields are computed here from their backing columns;
//! the raw columns never cross the wire.

pub mod error;
pub mod projection;
pub mod resolve;

pub use error::{ServerError, ServerResult};
pub use projection::{project, StorageProjection};
pub use resolve::{build_page, resolve_row, RowRelation, StorageRow};
