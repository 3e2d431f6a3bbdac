//! Namespaced key-value state written by runner scripts.
//!
//! Every runner gets its own namespace (its id), so two runners writing
//! the same key never see each other's values. Values are opaque text;
//! the sandbox stores JSON there.

use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

#[derive(Clone)]
pub struct RunnerStateStore {
    db: Database,
}

impl RunnerStateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Read `key` in `namespace`, `None` when it was never set or was removed.
    #[instrument(skip(self))]
    pub async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<String>> {
        let (namespace, key) = owned(namespace, key)?;
        self.db
            .execute(move |conn| {
                match conn.query_row(
                    "SELECT value FROM runner_state WHERE namespace = ?1 AND key = ?2",
                    rusqlite::params![namespace, key],
                    |row| row.get(0),
                ) {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// Insert or replace `key` in `namespace`.
    #[instrument(skip(self, value))]
    pub async fn set(&self, namespace: &str, key: &str, value: &str) -> StoreResult<()> {
        let (namespace, key) = owned(namespace, key)?;
        let value = value.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO runner_state (namespace, key, value, updated_at) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(namespace, key) DO UPDATE SET \
                       value = excluded.value, updated_at = excluded.updated_at",
                    rusqlite::params![namespace, key, value, chrono::Utc::now().timestamp()],
                )?;
                debug!(%namespace, %key, "runner state written");
                Ok(())
            })
            .await
    }

    /// Remove `key`; returns whether it existed.
    #[instrument(skip(self))]
    pub async fn remove(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        let (namespace, key) = owned(namespace, key)?;
        self.db
            .execute(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM runner_state WHERE namespace = ?1 AND key = ?2",
                    rusqlite::params![namespace, key],
                )?;
                Ok(removed > 0)
            })
            .await
    }

    /// Drop every key in `namespace`; returns how many were removed.
    #[instrument(skip(self))]
    pub async fn clear_namespace(&self, namespace: &str) -> StoreResult<usize> {
        let namespace = namespace.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM runner_state WHERE namespace = ?1",
                    rusqlite::params![namespace],
                )?)
            })
            .await
    }

    /// Keys currently set in `namespace`, sorted.
    pub async fn keys(&self, namespace: &str) -> StoreResult<Vec<String>> {
        let namespace = namespace.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT key FROM runner_state WHERE namespace = ?1 ORDER BY key",
                )?;
                let keys = stmt
                    .query_map(rusqlite::params![namespace], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
    }
}

fn owned(namespace: &str, key: &str) -> StoreResult<(String, String)> {
    if namespace.is_empty() {
        return Err(StoreError::EmptyKey { what: "namespace" });
    }
    Ok((namespace.to_string(), key.to_string()))
}
