use async_trait::async_trait;
use common::error::diagnostics::DiagnosticMessage;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {context}")]
    Unavailable { context: DiagnosticMessage },
    #[error("failed to serialise cache value: {context}")]
    Serialization {
        context: DiagnosticMessage,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid key pattern: {context}")]
    Pattern {
        context: DiagnosticMessage,
        #[source]
        source: regex::Error,
    },
}

impl CacheError {
    #[track_caller]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            context: DiagnosticMessage::new(message.into()),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            context: DiagnosticMessage::new(err.to_string()),
            source: err,
        }
    }
}

impl From<regex::Error> for CacheError {
    #[track_caller]
    fn from(err: regex::Error) -> Self {
        Self::Pattern {
            context: DiagnosticMessage::new(err.to_string()),
            source: err,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    Set { key: String, value: String },
    Delete { key: String },
}

/// Shared key-value cache holding environment status and cached configuration.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String) -> Result<(), CacheError>;
    /// Writes `value` only when the current value equals `expected`
    /// (`None` meaning the key is absent). Returns whether the write happened.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, CacheError>;
    /// Keys matching a glob pattern where `*` is any run and `?` one character.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError>;
    /// Applies every operation in order as one batch.
    async fn exec(&self, ops: Vec<CacheOp>) -> Result<(), CacheError>;

    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let keys = self.scan(pattern).await?;
        let count = keys.len();
        if count > 0 {
            self.exec(keys.into_iter().map(|key| CacheOp::Delete { key }).collect())
                .await?;
        }
        Ok(count)
    }
}

/// Writes queued during a workflow and flushed in one round trip.
#[derive(Debug, Default)]
pub struct CachePipeline {
    ops: Vec<CacheOp>,
}

impl CachePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.ops.push(CacheOp::Set {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn set_json<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_string(value)?;
        self.set(key, value);
        Ok(())
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.push(CacheOp::Delete { key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn discard(&mut self) {
        self.ops.clear();
    }

    pub async fn commit(&mut self, cache: &dyn KeyValueCache) -> Result<(), CacheError> {
        if self.ops.is_empty() {
            return Ok(());
        }
        let ops = std::mem::take(&mut self.ops);
        cache.exec(ops).await
    }
}

pub fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let mut expr = String::with_capacity(pattern.len() + 2);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Ok(Regex::new(&expr)?)
}

/// Cache kept in process memory; stands in for the shared cache server.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.read().clone()
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, CacheError> {
        let mut entries = self.entries.write();
        if entries.get(key).map(String::as_str) != expected {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let matcher = glob_to_regex(pattern)?;
        let mut keys: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|key| matcher.is_match(key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn exec(&self, ops: Vec<CacheOp>) -> Result<(), CacheError> {
        let mut entries = self.entries.write();
        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    entries.insert(key, value);
                }
                CacheOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}
