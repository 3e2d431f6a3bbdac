//! Vault error types.

/// Every public API in this crate returns [`VaultError`].
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Wrong key, tampered row, or a row moved to another namespace/key.
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    #[error("master key not found in keychain")]
    MasterKeyNotFound,

    #[error("invalid master key: {reason}")]
    InvalidMasterKey { reason: String },

    #[error("secure store schema setup failed: {reason}")]
    MigrationFailed { reason: String },

    /// Decrypted bytes were not UTF-8 text.
    #[error("stored secret is not valid text")]
    NotText,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Lock poisoning or CSPRNG failure.
    #[error("internal vault error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;
