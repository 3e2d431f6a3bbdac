//! Store errors.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The `info` column of a runner record is not valid JSON.
    #[error("runner info column: {0}")]
    InfoColumn(#[from] serde_json::Error),

    #[error("schema migration to v{version} failed: {message}")]
    Migration { version: u32, message: String },

    #[error("no record for runner `{runner_id}`")]
    UnknownRunner { runner_id: String },

    /// Empty runner ids and namespaces are refused before touching SQLite.
    #[error("empty {what}")]
    EmptyKey { what: &'static str },

    /// The connection lock was poisoned or a blocking task died.
    #[error("database worker: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Worker(err.to_string())
    }
}
