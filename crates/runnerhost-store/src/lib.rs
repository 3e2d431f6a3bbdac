//! # runnerhost-store
//!
//! Storage engine for RunnerHost.
//!
//! Provides SQLite-backed persistence with WAL mode for the two things the
//! runner bridge needs to keep across restarts: the plain key-value state
//! that runner scripts write through the object-store channel, and the
//! runner records (identity, environment, intents) computed at bootstrap.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  CacheLayer (moka)                      │
//! ├─────────────────────────────────────────┤
//! │  RunnerStateStore  (namespace, key)     │
//! │  RunnerRecordStore (runner records)     │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite WAL)                │
//! │  Migrations (versioned, transactional)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use runnerhost_store::{Database, RunnerStateStore};
//!
//! let db = Database::open_and_migrate("data/runnerhost.db").await?;
//! let state = RunnerStateStore::new(db.clone());
//! state.set("com.example.source", "token", "\"abc\"").await?;
//! ```

pub mod cache;
pub mod db;
pub mod error;
pub mod migration;
pub mod records;
pub mod state;

// ── re-exports ───────────────────────────────────────────────────────

pub use cache::{CacheLayer, CacheLayerBuilder, CacheStats};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use records::{RunnerRecord, RunnerRecordStore};
pub use state::RunnerStateStore;
