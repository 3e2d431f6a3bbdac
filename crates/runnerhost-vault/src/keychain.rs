//! Master key storage.
//!
//! The secure store's master key never touches disk in the clear. A
//! [`KeychainProvider`] hides where it lives; [`FileKeychain`] is the
//! portable fallback that seals it with a key derived from the machine
//! and user identity.

use std::path::{Path, PathBuf};

use crate::crypto;
use crate::error::{Result, VaultError};

/// Platform secure storage for the master key.
pub trait KeychainProvider: Send + Sync {
    /// Fails with [`VaultError::MasterKeyNotFound`] before the first `set`.
    fn get_master_key(&self) -> Result<Vec<u8>>;

    fn set_master_key(&self, key: &[u8]) -> Result<()>;

    fn has_master_key(&self) -> Result<bool>;

    fn delete_master_key(&self) -> Result<()>;
}

/// Return the stored master key, generating and storing one on first use.
pub fn load_or_create_master_key(provider: &dyn KeychainProvider) -> Result<Vec<u8>> {
    match provider.get_master_key() {
        Ok(key) if key.len() == crypto::KEY_LEN => Ok(key),
        Ok(key) => Err(VaultError::InvalidMasterKey {
            reason: format!("expected {} bytes, found {}", crypto::KEY_LEN, key.len()),
        }),
        Err(VaultError::MasterKeyNotFound) => {
            let key = crypto::generate_key()?;
            provider.set_master_key(&key)?;
            tracing::info!("generated new master key");
            Ok(key)
        }
        Err(e) => Err(e),
    }
}

const DEVICE_SALT: &[u8] = b"runnerhost-keychain-v1";

/// Master key sealed in a file.
///
/// Layout: `[12-byte nonce][ciphertext + 16-byte tag]`.
pub struct FileKeychain {
    path: PathBuf,
}

impl FileKeychain {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/master.key`
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("master.key")
    }

    fn device_key() -> [u8; crypto::KEY_LEN] {
        let host = std::fs::read_to_string("/etc/hostname")
            .map(|s| s.trim().to_string())
            .or_else(|_| std::env::var("HOSTNAME"))
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "localhost".into());
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "nobody".into());
        crypto::derive_key(format!("{host}\0{user}").as_bytes(), DEVICE_SALT)
    }
}

impl KeychainProvider for FileKeychain {
    fn get_master_key(&self) -> Result<Vec<u8>> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::MasterKeyNotFound);
            }
            Err(e) => return Err(e.into()),
        };
        if data.len() < crypto::NONCE_LEN_BYTES + crypto::TAG_LEN {
            return Err(VaultError::DecryptionFailed {
                reason: "master key file truncated".into(),
            });
        }

        let (nonce_bytes, sealed) = data.split_at(crypto::NONCE_LEN_BYTES);
        let mut nonce = [0u8; crypto::NONCE_LEN_BYTES];
        nonce.copy_from_slice(nonce_bytes);
        crypto::open(&nonce, sealed, &Self::device_key(), DEVICE_SALT)
    }

    fn set_master_key(&self, key: &[u8]) -> Result<()> {
        let (nonce, sealed) = crypto::seal(key, &Self::device_key(), DEVICE_SALT)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut data = Vec::with_capacity(nonce.len() + sealed.len());
        data.extend_from_slice(&nonce);
        data.extend_from_slice(&sealed);
        std::fs::write(&self.path, &data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(path = %self.path.display(), "master key stored");
        Ok(())
    }

    fn has_master_key(&self) -> Result<bool> {
        Ok(self.path.exists())
    }

    fn delete_master_key(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
