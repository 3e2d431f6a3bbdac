//! The runner database: one SQLite connection shared by the record store
//! and the object store.
//!
//! SQLite calls are blocking, so every query runs on tokio's blocking pool
//! while holding the connection mutex.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::migration;

/// Cloneable handle; clones share the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    /// `None` for in-memory databases.
    location: Option<Arc<PathBuf>>,
}

impl Database {
    /// Open or create the database file. Blocks on file I/O; async callers
    /// go through [`Database::open_and_migrate`].
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening runner database");
        let conn = configure(Connection::open(path)?)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: Some(Arc::new(path.to_path_buf())),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory runner database");
        let conn = configure(Connection::open_in_memory()?)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: None,
        })
    }

    pub async fn open_and_migrate(path: impl AsRef<Path> + Send + 'static) -> StoreResult<Self> {
        let db = tokio::task::spawn_blocking(move || Self::open(path)).await??;
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        self.execute(migration::run_all).await
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref().map(PathBuf::as_path)
    }

    /// Run `f` against the connection on the blocking pool.
    pub async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Worker("connection lock poisoned".into()))?;
            f(&guard)
        })
        .await?
    }
}

/// WAL journal; writers wait up to five seconds on a busy database.
fn configure(conn: Connection) -> StoreResult<Connection> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "busy_timeout", 5_000_i32)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count(db: &Database, table: &'static str) -> i64 {
        db.execute(move |conn| Ok(conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |row| row.get(0))?))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn migrated_database_is_empty() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        assert!(db.location().is_none());
        assert_eq!(count(&db, "runner_state").await, 0);
        assert_eq!(count(&db, "runners").await, 0);
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runners.db");

        let db = Database::open_and_migrate(path.clone()).await.unwrap();
        assert_eq!(db.location(), Some(path.as_path()));
        db.execute(|conn| {
            conn.execute(
                "INSERT INTO runner_state (namespace, key, value, updated_at) VALUES ('demo', 'k', '\"v\"', 0)",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();
        drop(db);

        let reopened = Database::open_and_migrate(path).await.unwrap();
        assert_eq!(count(&reopened, "runner_state").await, 1);
    }
}
