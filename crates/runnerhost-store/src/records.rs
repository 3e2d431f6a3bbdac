//! Persisted runner records.
//!
//! A record is written once a runner has bootstrapped and been classified,
//! so hosts can list installed runners and answer capability questions
//! without starting a sandbox.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::cache::CacheLayer;
use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// What the host learned about a runner at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerRecord {
    pub id: String,
    pub name: String,
    pub version: f64,
    /// `source`, `tracker` or `plugin`.
    pub environment: String,
    /// Intent flag names, e.g. `chapter_event_handler`, `auth:basic`.
    pub intents: Vec<String>,
    /// Which sandbox backend hosted the runner.
    pub backend: String,
    /// The raw `info` object the runner exposed.
    pub info: serde_json::Value,
    pub updated_at: i64,
}

impl RunnerRecord {
    pub fn has_intent(&self, intent: &str) -> bool {
        self.intents.iter().any(|i| i == intent)
    }
}

/// SQLite-backed [`RunnerRecord`] repository with a read-through cache.
#[derive(Clone)]
pub struct RunnerRecordStore {
    db: Database,
    cache: CacheLayer<RunnerRecord>,
}

impl RunnerRecordStore {
    pub fn new(db: Database) -> Self {
        let cache = CacheLayer::builder("runner_records")
            .max_capacity(256)
            .ttl(Duration::from_secs(600))
            .build();
        Self { db, cache }
    }

    /// Insert or replace the record for `record.id`.
    #[instrument(skip(self, record), fields(id = %record.id))]
    pub async fn save(&self, record: &RunnerRecord) -> StoreResult<()> {
        if record.id.is_empty() {
            return Err(StoreError::EmptyKey { what: "runner id" });
        }
        let intents = serde_json::to_string(&record.intents)?;
        let info = serde_json::to_string(&record.info)?;
        let row = record.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO runners (id, name, version, environment, intents, backend, info, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                     ON CONFLICT(id) DO UPDATE SET \
                       name = excluded.name, version = excluded.version, \
                       environment = excluded.environment, intents = excluded.intents, \
                       backend = excluded.backend, info = excluded.info, \
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        row.id,
                        row.name,
                        row.version,
                        row.environment,
                        intents,
                        row.backend,
                        info,
                        row.updated_at
                    ],
                )?;
                Ok(())
            })
            .await?;
        self.cache.insert(&record.id, record.clone()).await;
        debug!("runner record saved");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Option<RunnerRecord>> {
        let db = self.db.clone();
        let owned = id.to_string();
        self.cache
            .get_or_load(id, || async move {
                db.execute(move |conn| {
                    match conn.query_row(
                        "SELECT id, name, version, environment, intents, backend, info, updated_at \
                         FROM runners WHERE id = ?1",
                        rusqlite::params![owned],
                        row_to_raw,
                    ) {
                        Ok(raw) => Ok(Some(raw.into_record()?)),
                        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                        Err(e) => Err(e.into()),
                    }
                })
                .await
            })
            .await
    }

    /// All records ordered by id, optionally restricted to one environment.
    pub async fn list(&self, environment: Option<&str>) -> StoreResult<Vec<RunnerRecord>> {
        let environment = environment.map(str::to_string);
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, version, environment, intents, backend, info, updated_at \
                     FROM runners WHERE ?1 IS NULL OR environment = ?1 ORDER BY id",
                )?;
                let raws = stmt
                    .query_map(rusqlite::params![environment], row_to_raw)?
                    .collect::<Result<Vec<_>, _>>()?;
                raws.into_iter().map(RawRecord::into_record).collect()
            })
            .await
    }

    /// Delete the record for `id`. A missing id is `UnknownRunner`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let owned = id.to_string();
        let removed = self
            .db
            .execute(move |conn| {
                Ok(conn.execute("DELETE FROM runners WHERE id = ?1", rusqlite::params![owned])?)
            })
            .await?;
        self.cache.invalidate(id).await;
        if removed == 0 {
            return Err(StoreError::UnknownRunner {
                runner_id: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn cache(&self) -> &CacheLayer<RunnerRecord> {
        &self.cache
    }
}

struct RawRecord {
    id: String,
    name: String,
    version: f64,
    environment: String,
    intents: String,
    backend: String,
    info: String,
    updated_at: i64,
}

impl RawRecord {
    fn into_record(self) -> StoreResult<RunnerRecord> {
        Ok(RunnerRecord {
            id: self.id,
            name: self.name,
            version: self.version,
            environment: self.environment,
            intents: serde_json::from_str(&self.intents)?,
            backend: self.backend,
            info: serde_json::from_str(&self.info)?,
            updated_at: self.updated_at,
        })
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        environment: row.get(3)?,
        intents: row.get(4)?,
        backend: row.get(5)?,
        info: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, environment: &str) -> RunnerRecord {
        RunnerRecord {
            id: id.into(),
            name: format!("{id} runner"),
            version: 1.5,
            environment: environment.into(),
            intents: vec!["chapters".into(), "imageRequestHandler".into()],
            backend: "in_process".into(),
            info: serde_json::json!({ "id": id, "version": 1.5 }),
            updated_at: 1_700_000_000,
        }
    }

    async fn store() -> RunnerRecordStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        RunnerRecordStore::new(db)
    }

    #[tokio::test]
    async fn save_and_get() {
        let store = store().await;
        store.save(&record("a", "source")).await.unwrap();
        store.cache().invalidate_all();

        let loaded = store.get("a").await.unwrap().unwrap();
        assert_eq!(loaded, record("a", "source"));
        assert!(loaded.has_intent("chapters"));
        assert!(!loaded.has_intent("pageLinkResolver"));
    }

    #[tokio::test]
    async fn save_replaces_existing() {
        let store = store().await;
        store.save(&record("a", "source")).await.unwrap();
        let mut updated = record("a", "source");
        updated.version = 2.0;
        store.save(&updated).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap().version, 2.0);
        assert_eq!(store.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_environment() {
        let store = store().await;
        store.save(&record("b", "tracker")).await.unwrap();
        store.save(&record("a", "source")).await.unwrap();

        let all: Vec<_> = store.list(None).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(all, vec!["a", "b"]);
        let trackers = store.list(Some("tracker")).await.unwrap();
        assert_eq!(trackers.len(), 1);
        assert_eq!(trackers[0].id, "b");
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = store().await;
        let err = store.delete("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownRunner { .. }));
    }

    #[tokio::test]
    async fn delete_evicts_cache() {
        let store = store().await;
        store.save(&record("a", "source")).await.unwrap();
        assert!(store.get("a").await.unwrap().is_some());
        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }
}
