//! Injected capabilities: plan persistence and remote publishing.
//!
//! The session never talks to a concrete database or object store. It is
//! handed implementations of these traits at construction time.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{EverythingPdfError, Result};

/// Opaque string key-value storage (used to persist the plan).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key was never written.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write (or overwrite) a value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Remote object-store collaborator that turns a built document into a
/// publicly resolvable URL.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload `bytes` under `suggested_name` and return the public URL.
    async fn publish(&self, bytes: &[u8], suggested_name: &str) -> Result<String>;
}

/// In-process [`KeyValueStore`], used by tests and as a fallback when no
/// state database can be opened.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| EverythingPdfError::Storage(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| EverythingPdfError::Storage(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "1").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("1"));

        store.set("k", "0").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("0"));
    }
}
