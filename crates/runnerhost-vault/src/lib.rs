//! Encrypted secure store for RunnerHost.
//!
//! Runner scripts keep credentials (session tokens, passwords) through the
//! secure-store channel. This crate encrypts those values at rest with
//! AES-256-GCM and keeps the master key in a [`KeychainProvider`].
//!
//! - [`crypto`]: sealing, opening, PBKDF2 derivation.
//! - [`keychain`]: master key storage.
//! - [`store`]: the SQLite-backed [`SecureStore`].
//!
//! ```rust,no_run
//! use runnerhost_vault::{FileKeychain, SecureStore, keychain};
//!
//! # fn example() -> runnerhost_vault::Result<()> {
//! let keychain = FileKeychain::new("data/master.key");
//! let master_key = keychain::load_or_create_master_key(&keychain)?;
//! let secure = SecureStore::open("data/secure.db", &master_key)?;
//! secure.set("com.example.source", "session", "\"token\"")?;
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod keychain;
pub mod store;

pub use error::{Result, VaultError};
pub use keychain::{FileKeychain, KeychainProvider};
pub use store::SecureStore;
