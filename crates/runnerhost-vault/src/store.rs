//! SQLite-backed encrypted key-value store for runner secrets.
//!
//! Rows are namespaced by runner id like the plain state store, but the
//! value column holds AES-256-GCM ciphertext. The namespace and key are
//! bound as authenticated data, so a row copied under a different
//! namespace or key fails to decrypt.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};

use crate::crypto;
use crate::error::{Result, VaultError};

/// Encrypted `(namespace, key) -> text` store.
///
/// Synchronous; async callers should wrap calls in `spawn_blocking`.
pub struct SecureStore {
    conn: Mutex<Connection>,
    master_key: Vec<u8>,
}

impl SecureStore {
    pub fn open(path: impl AsRef<Path>, master_key: &[u8]) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "opening secure store");
        Self::with_connection(Connection::open(path)?, master_key)
    }

    pub fn open_in_memory(master_key: &[u8]) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, master_key)
    }

    fn with_connection(conn: Connection, master_key: &[u8]) -> Result<Self> {
        if master_key.len() != crypto::KEY_LEN {
            return Err(VaultError::InvalidMasterKey {
                reason: format!("expected {} bytes, got {}", crypto::KEY_LEN, master_key.len()),
            });
        }

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS secure_state (
                namespace  TEXT NOT NULL,
                key        TEXT NOT NULL,
                data       BLOB NOT NULL,
                nonce      BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            );",
        )
        .map_err(|e| VaultError::MigrationFailed { reason: e.to_string() })?;

        Ok(Self {
            conn: Mutex::new(conn),
            master_key: master_key.to_vec(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| VaultError::Internal(format!("secure store lock poisoned: {e}")))
    }

    fn context(namespace: &str, key: &str) -> Vec<u8> {
        let mut ctx = Vec::with_capacity(namespace.len() + key.len() + 1);
        ctx.extend_from_slice(namespace.as_bytes());
        ctx.push(0);
        ctx.extend_from_slice(key.as_bytes());
        ctx
    }

    /// Decrypt the value under `(namespace, key)`; `None` when unset.
    pub fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let row: Option<(Vec<u8>, Vec<u8>)> = self
            .lock()?
            .query_row(
                "SELECT data, nonce FROM secure_state WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((data, nonce_bytes)) = row else {
            return Ok(None);
        };
        let nonce: [u8; crypto::NONCE_LEN_BYTES] =
            nonce_bytes
                .as_slice()
                .try_into()
                .map_err(|_| VaultError::DecryptionFailed {
                    reason: "stored nonce has wrong length".into(),
                })?;

        let plain = crypto::open(&nonce, &data, &self.master_key, &Self::context(namespace, key))?;
        String::from_utf8(plain).map(Some).map_err(|_| VaultError::NotText)
    }

    /// Encrypt and insert or replace `value`.
    pub fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let (nonce, data) = crypto::seal(
            value.as_bytes(),
            &self.master_key,
            &Self::context(namespace, key),
        )?;
        self.lock()?.execute(
            "INSERT INTO secure_state (namespace, key, data, nonce, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(namespace, key) DO UPDATE SET \
               data = excluded.data, nonce = excluded.nonce, updated_at = excluded.updated_at",
            params![namespace, key, data, nonce.as_slice(), chrono::Utc::now().timestamp()],
        )?;
        tracing::debug!(namespace, key, "secure value written");
        Ok(())
    }

    /// Remove `(namespace, key)`; returns whether it existed.
    pub fn remove(&self, namespace: &str, key: &str) -> Result<bool> {
        let removed = self.lock()?.execute(
            "DELETE FROM secure_state WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;
        Ok(removed > 0)
    }

    /// Drop every secret of one runner.
    pub fn clear_namespace(&self, namespace: &str) -> Result<usize> {
        Ok(self.lock()?.execute(
            "DELETE FROM secure_state WHERE namespace = ?1",
            params![namespace],
        )?)
    }
}
