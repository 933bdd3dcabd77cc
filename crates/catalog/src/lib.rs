pub mod diff;
pub mod error;
pub mod paths;

pub use diff::{diff, ChangeSet, FieldChanges, FieldDelta, ModelDelta};
pub use error::CatalogError;
pub use paths::{process_database, sort_fields};
