pub mod environment;
pub mod job;
pub mod schema;
pub mod status;

pub use environment::{Environment, Resource, ResourceAccess, ResourceMapping};
pub use job::{Job, JobKind, SubAction};
pub use schema::{
    DatabaseConfig, DatabaseType, Field, FieldCreator, FieldKind, HierarchyEntry, Model,
    ModelType, ReferenceAction, UnknownFieldType,
};
pub use status::EnvStatus;
