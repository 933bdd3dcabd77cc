use std::fmt;

/// Change to a document database, applied through the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOp {
    CreateCollection { name: String },
    DropCollection { name: String },
    RenameCollection { from: String, to: String },
    RenameField {
        collection: String,
        path: String,
        new_name: String,
    },
    UnsetField { collection: String, path: String },
    /// Recompute the collection's required indexes and converge on them.
    SyncIndexes { collection: String },
}

/// A composable unit of schema work produced by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Sql(String),
    Document(DocumentOp),
}

impl fmt::Display for DocumentOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentOp::CreateCollection { name } => write!(f, "createCollection({name})"),
            DocumentOp::DropCollection { name } => write!(f, "dropCollection({name})"),
            DocumentOp::RenameCollection { from, to } => {
                write!(f, "renameCollection({from} -> {to})")
            }
            DocumentOp::RenameField {
                collection,
                path,
                new_name,
            } => write!(f, "{collection}.updateMany({{}}, {{$rename: {{{path}: {new_name}}}}})"),
            DocumentOp::UnsetField { collection, path } => {
                write!(f, "{collection}.updateMany({{}}, {{$unset: {{{path}: \"\"}}}})")
            }
            DocumentOp::SyncIndexes { collection } => write!(f, "syncIndexes({collection})"),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Sql(sql) => f.write_str(sql),
            Statement::Document(op) => write!(f, "{op}"),
        }
    }
}
