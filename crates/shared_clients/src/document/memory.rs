use super::{DocFilter, DocumentStore, IndexSpec};
use crate::DatabaseAdapterError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

const ALL_ELEMENTS: &str = "$[]";

#[derive(Debug, Default, Clone)]
struct Collection {
    docs: Vec<Value>,
    indexes: Vec<IndexSpec>,
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeMap<String, BTreeMap<String, Collection>>,
}

/// Process-local document store used for dry runs and tests.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<RwLock<State>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the documents of one collection, empty when absent.
    pub fn documents(&self, db: &str, collection: &str) -> Vec<Value> {
        self.inner
            .read()
            .databases
            .get(db)
            .and_then(|d| d.get(collection))
            .map(|c| c.docs.clone())
            .unwrap_or_default()
    }

    pub fn has_database(&self, db: &str) -> bool {
        self.inner.read().databases.contains_key(db)
    }
}

fn with_collection<T>(
    state: &mut State,
    db: &str,
    collection: &str,
    f: impl FnOnce(&mut Collection) -> T,
) -> Result<T, DatabaseAdapterError> {
    state
        .databases
        .get_mut(db)
        .and_then(|d| d.get_mut(collection))
        .map(f)
        .ok_or_else(|| DatabaseAdapterError::not_found(format!("collection {db}.{collection}")))
}

fn rename_at(value: &mut Value, path: &[&str], new_name: &str) -> bool {
    match path {
        [] => false,
        [last] => match value.as_object_mut() {
            Some(obj) => match obj.remove(*last) {
                Some(v) => {
                    obj.insert(new_name.to_string(), v);
                    true
                }
                None => false,
            },
            None => false,
        },
        [head, rest @ ..] if *head == ALL_ELEMENTS => match value.as_array_mut() {
            Some(items) => items
                .iter_mut()
                .fold(false, |changed, item| rename_at(item, rest, new_name) || changed),
            None => false,
        },
        [head, rest @ ..] => value
            .get_mut(*head)
            .is_some_and(|child| rename_at(child, rest, new_name)),
    }
}

fn unset_at(value: &mut Value, path: &[&str]) -> bool {
    match path {
        [] => false,
        [last] => value
            .as_object_mut()
            .is_some_and(|obj| obj.remove(*last).is_some()),
        [head, rest @ ..] if *head == ALL_ELEMENTS => match value.as_array_mut() {
            Some(items) => items
                .iter_mut()
                .fold(false, |changed, item| unset_at(item, rest) || changed),
            None => false,
        },
        [head, rest @ ..] => value
            .get_mut(*head)
            .is_some_and(|child| unset_at(child, rest)),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list_databases(&self) -> Result<Vec<String>, DatabaseAdapterError> {
        Ok(self.inner.read().databases.keys().cloned().collect())
    }

    async fn drop_database(&self, db: &str) -> Result<(), DatabaseAdapterError> {
        self.inner.write().databases.remove(db);
        Ok(())
    }

    async fn list_collections(&self, db: &str) -> Result<Vec<String>, DatabaseAdapterError> {
        Ok(self
            .inner
            .read()
            .databases
            .get(db)
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_collection(&self, db: &str, name: &str) -> Result<(), DatabaseAdapterError> {
        let mut state = self.inner.write();
        let database = state.databases.entry(db.to_string()).or_default();
        if database.contains_key(name) {
            return Err(DatabaseAdapterError::already_exists(format!(
                "collection {db}.{name}"
            )));
        }
        database.insert(name.to_string(), Collection::default());
        Ok(())
    }

    async fn drop_collection(&self, db: &str, name: &str) -> Result<(), DatabaseAdapterError> {
        if let Some(database) = self.inner.write().databases.get_mut(db) {
            database.remove(name);
        }
        Ok(())
    }

    async fn rename_collection(
        &self,
        db: &str,
        from: &str,
        to: &str,
    ) -> Result<(), DatabaseAdapterError> {
        let mut state = self.inner.write();
        let database = state
            .databases
            .get_mut(db)
            .ok_or_else(|| DatabaseAdapterError::not_found(format!("database {db}")))?;
        if database.contains_key(to) {
            return Err(DatabaseAdapterError::already_exists(format!(
                "collection {db}.{to}"
            )));
        }
        let collection = database
            .remove(from)
            .ok_or_else(|| DatabaseAdapterError::not_found(format!("collection {db}.{from}")))?;
        database.insert(to.to_string(), collection);
        Ok(())
    }

    async fn list_indexes(
        &self,
        db: &str,
        collection: &str,
    ) -> Result<Vec<IndexSpec>, DatabaseAdapterError> {
        let mut state = self.inner.write();
        with_collection(&mut state, db, collection, |c| c.indexes.clone())
    }

    async fn create_indexes(
        &self,
        db: &str,
        collection: &str,
        indexes: &[IndexSpec],
    ) -> Result<(), DatabaseAdapterError> {
        let mut state = self.inner.write();
        with_collection(&mut state, db, collection, |c| {
            for index in indexes {
                if c.indexes.iter().any(|existing| existing.same_definition(index)) {
                    continue;
                }
                let mut stored = index.clone();
                stored.name = Some(index.resolved_name());
                c.indexes.push(stored);
            }
        })
    }

    async fn drop_index(
        &self,
        db: &str,
        collection: &str,
        name: &str,
    ) -> Result<(), DatabaseAdapterError> {
        let mut state = self.inner.write();
        let removed = with_collection(&mut state, db, collection, |c| {
            let before = c.indexes.len();
            c.indexes.retain(|i| i.resolved_name() != name);
            before != c.indexes.len()
        })?;
        if removed {
            Ok(())
        } else {
            Err(DatabaseAdapterError::not_found(format!(
                "index {name} on {db}.{collection}"
            )))
        }
    }

    async fn rename_field(
        &self,
        db: &str,
        collection: &str,
        path: &str,
        new_name: &str,
    ) -> Result<u64, DatabaseAdapterError> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut state = self.inner.write();
        with_collection(&mut state, db, collection, |c| {
            c.docs
                .iter_mut()
                .filter_map(|doc| rename_at(doc, &segments, new_name).then_some(()))
                .count() as u64
        })
    }

    async fn unset_field(
        &self,
        db: &str,
        collection: &str,
        path: &str,
    ) -> Result<u64, DatabaseAdapterError> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut state = self.inner.write();
        with_collection(&mut state, db, collection, |c| {
            c.docs
                .iter_mut()
                .filter_map(|doc| unset_at(doc, &segments).then_some(()))
                .count() as u64
        })
    }

    async fn insert_many(
        &self,
        db: &str,
        collection: &str,
        docs: Vec<Value>,
    ) -> Result<(), DatabaseAdapterError> {
        // inserts create the collection on demand, like the server does
        let mut state = self.inner.write();
        state
            .databases
            .entry(db.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .docs
            .extend(docs);
        Ok(())
    }

    async fn find(
        &self,
        db: &str,
        collection: &str,
        filter: &DocFilter,
    ) -> Result<Vec<Value>, DatabaseAdapterError> {
        Ok(self
            .documents(db, collection)
            .into_iter()
            .filter(|doc| filter.matches(doc))
            .collect())
    }

    async fn delete_many(
        &self,
        db: &str,
        collection: &str,
        filter: &DocFilter,
    ) -> Result<u64, DatabaseAdapterError> {
        let mut state = self.inner.write();
        let Some(c) = state.databases.get_mut(db).and_then(|d| d.get_mut(collection)) else {
            return Ok(0);
        };
        let before = c.docs.len();
        c.docs.retain(|doc| !filter.matches(doc));
        Ok((before - c.docs.len()) as u64)
    }

    async fn close(&self) -> Result<(), DatabaseAdapterError> {
        Ok(())
    }
}
