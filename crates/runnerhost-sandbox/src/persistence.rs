//! Persistence collaborator seam for the store channel.
//!
//! The store channel only needs `get/set/remove` by `(namespace, key)`.
//! [`KeyValueStore`] is that seam; the SQLite state store, the encrypted
//! vault store and an in-memory map implement it.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use runnerhost_store::RunnerStateStore;
use runnerhost_vault::SecureStore;

use crate::error::Result;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, namespace: &str, key: &str) -> Result<()>;
}

#[async_trait]
impl KeyValueStore for RunnerStateStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(RunnerStateStore::get(self, namespace, key).await?)
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        Ok(RunnerStateStore::set(self, namespace, key, value).await?)
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        RunnerStateStore::remove(self, namespace, key).await?;
        Ok(())
    }
}

/// [`SecureStore`] adapter; the vault is synchronous, so calls run on the
/// blocking pool.
#[derive(Clone)]
pub struct EncryptedStore {
    inner: Arc<SecureStore>,
}

impl EncryptedStore {
    pub fn new(inner: Arc<SecureStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl KeyValueStore for EncryptedStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let (store, namespace, key) = (Arc::clone(&self.inner), namespace.to_string(), key.to_string());
        Ok(tokio::task::spawn_blocking(move || store.get(&namespace, &key)).await??)
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let store = Arc::clone(&self.inner);
        let (namespace, key, value) = (namespace.to_string(), key.to_string(), value.to_string());
        Ok(tokio::task::spawn_blocking(move || store.set(&namespace, &key, &value)).await??)
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        let (store, namespace, key) = (Arc::clone(&self.inner), namespace.to_string(), key.to_string());
        tokio::task::spawn_blocking(move || store.remove(&namespace, &key)).await??;
        Ok(())
    }
}

/// Process-local store, for tests and throwaway hosts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<(String, String), String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .get(&(namespace.to_string(), key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.entries
            .insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        self.entries.remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}
