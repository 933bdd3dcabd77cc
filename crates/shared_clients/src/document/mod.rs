mod memory;

pub use memory::MemoryDocumentStore;

use crate::DatabaseAdapterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Direction or special type of one index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKey {
    Asc,
    Desc,
    Text,
    #[serde(rename = "2dsphere")]
    Geo2dSphere,
}

impl IndexKey {
    fn suffix(&self) -> &'static str {
        match self {
            IndexKey::Asc => "1",
            IndexKey::Desc => "-1",
            IndexKey::Text => "text",
            IndexKey::Geo2dSphere => "2dsphere",
        }
    }
}

/// Index definition on a document collection. Key order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: Option<String>,
    pub keys: Vec<(String, IndexKey)>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub sparse: bool,
    #[serde(default)]
    pub expire_after_seconds: Option<u64>,
}

impl IndexSpec {
    pub fn on(path: impl Into<String>, key: IndexKey) -> Self {
        Self {
            name: None,
            keys: vec![(path.into(), key)],
            unique: false,
            sparse: false,
            expire_after_seconds: None,
        }
    }

    pub fn ascending(path: impl Into<String>) -> Self {
        Self::on(path, IndexKey::Asc)
    }

    pub fn unique_sparse(mut self) -> Self {
        self.unique = true;
        self.sparse = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    pub fn expire_after(mut self, seconds: u64) -> Self {
        self.expire_after_seconds = Some(seconds);
        self
    }

    /// Name the server would generate, e.g. `profile.age_1_name_text`.
    pub fn resolved_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.keys
            .iter()
            .map(|(path, key)| format!("{}_{}", path, key.suffix()))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn is_text(&self) -> bool {
        self.keys.iter().any(|(_, key)| *key == IndexKey::Text)
    }

    /// Paths covered by the text part of the index, sorted.
    pub fn text_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .keys
            .iter()
            .filter(|(_, key)| *key == IndexKey::Text)
            .map(|(path, _)| path.as_str())
            .collect();
        paths.sort_unstable();
        paths
    }

    /// Same keys in the same order with the same uniqueness options.
    pub fn same_definition(&self, other: &IndexSpec) -> bool {
        self.keys == other.keys && self.unique == other.unique && self.sparse == other.sparse
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocFilter {
    All,
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl DocFilter {
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            DocFilter::All => true,
            DocFilter::Eq(field, value) => doc.get(field) == Some(value),
            DocFilter::In(field, values) => doc
                .get(field)
                .is_some_and(|v| values.iter().any(|candidate| candidate == v)),
        }
    }
}

/// Operations the engine needs from a document database server.
///
/// Paths use dotted notation; a `$[]` segment addresses every element of an
/// array, as in the server's all-positional update operator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_databases(&self) -> Result<Vec<String>, DatabaseAdapterError>;
    async fn drop_database(&self, db: &str) -> Result<(), DatabaseAdapterError>;

    async fn list_collections(&self, db: &str) -> Result<Vec<String>, DatabaseAdapterError>;
    async fn create_collection(&self, db: &str, name: &str) -> Result<(), DatabaseAdapterError>;
    async fn drop_collection(&self, db: &str, name: &str) -> Result<(), DatabaseAdapterError>;
    async fn rename_collection(
        &self,
        db: &str,
        from: &str,
        to: &str,
    ) -> Result<(), DatabaseAdapterError>;

    async fn list_indexes(
        &self,
        db: &str,
        collection: &str,
    ) -> Result<Vec<IndexSpec>, DatabaseAdapterError>;
    async fn create_indexes(
        &self,
        db: &str,
        collection: &str,
        indexes: &[IndexSpec],
    ) -> Result<(), DatabaseAdapterError>;
    async fn drop_index(
        &self,
        db: &str,
        collection: &str,
        name: &str,
    ) -> Result<(), DatabaseAdapterError>;

    /// Renames the last segment of `path` to `new_name` in every document.
    async fn rename_field(
        &self,
        db: &str,
        collection: &str,
        path: &str,
        new_name: &str,
    ) -> Result<u64, DatabaseAdapterError>;
    /// Removes `path` from every document.
    async fn unset_field(
        &self,
        db: &str,
        collection: &str,
        path: &str,
    ) -> Result<u64, DatabaseAdapterError>;

    async fn insert_many(
        &self,
        db: &str,
        collection: &str,
        docs: Vec<Value>,
    ) -> Result<(), DatabaseAdapterError>;
    async fn find(
        &self,
        db: &str,
        collection: &str,
        filter: &DocFilter,
    ) -> Result<Vec<Value>, DatabaseAdapterError>;
    async fn delete_many(
        &self,
        db: &str,
        collection: &str,
        filter: &DocFilter,
    ) -> Result<u64, DatabaseAdapterError>;

    async fn close(&self) -> Result<(), DatabaseAdapterError>;
}
