use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::KeyValueStore;
use crate::error::Result;

/// Volatile store backed by a map. Used by tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Wraps a [`MemoryStore`] and rejects a chosen number of writes per key.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingStore {
    inner: MemoryStore,
    failing_writes: std::sync::Mutex<HashMap<String, usize>>,
}

#[cfg(test)]
impl FailingStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes (set or remove) of `key` fail.
    pub(crate) fn fail_next_writes(&self, key: &str, count: usize) {
        self.failing_writes
            .lock()
            .unwrap()
            .insert(key.to_string(), count);
    }

    fn take_failure(&self, key: &str) -> Result<()> {
        let mut failing = self.failing_writes.lock().unwrap();
        match failing.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(crate::error::AuthieError::Storage(format!(
                    "Write to {} rejected",
                    key
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.take_failure(key)?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.take_failure(key)?;
        self.inner.remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("tokens").await.unwrap(), None);

        store.set("tokens", "[]").await.unwrap();
        store.set("tokens", "[1]").await.unwrap();
        assert_eq!(store.get("tokens").await.unwrap().as_deref(), Some("[1]"));
        assert_eq!(store.len().await, 1);

        store.remove("tokens").await.unwrap();
        store.remove("tokens").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failing_store_rejects_chosen_writes() {
        let store = FailingStore::new();
        store.fail_next_writes("tokens", 1);

        assert!(store.set("tokens", "[]").await.is_err());
        assert_eq!(store.get("tokens").await.unwrap(), None);
        store.set("tokens", "[]").await.unwrap();
        store.set("passcodeSalt", "c2FsdA==").await.unwrap();
        assert_eq!(store.get("tokens").await.unwrap().as_deref(), Some("[]"));
    }
}
