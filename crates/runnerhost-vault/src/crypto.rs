//! AES-256-GCM sealing with `ring`, plus PBKDF2 key derivation.
//!
//! Every seal draws a fresh random 96-bit nonce. Callers can bind the
//! ciphertext to a context string through the additional authenticated
//! data, so a sealed value copied to another slot fails to open.

use std::num::NonZeroU32;

use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;
pub const SALT_LEN: usize = 32;
/// GCM tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(210_000) {
    Some(n) => n,
    None => unreachable!(),
};

/// One nonce per key: `ring` wants a sequence, we only ever need one.
struct OneShot(Option<[u8; NONCE_LEN_BYTES]>);

impl NonceSequence for OneShot {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

fn unbound(key: &[u8]) -> std::result::Result<UnboundKey, String> {
    if key.len() != KEY_LEN {
        return Err(format!("key must be {KEY_LEN} bytes, got {}", key.len()));
    }
    UnboundKey::new(&aead::AES_256_GCM, key).map_err(|_| "unusable AES-256-GCM key".to_string())
}

/// Seal `plaintext`, authenticating `context` alongside it.
///
/// Returns the nonce and the ciphertext with its tag appended.
pub fn seal(plaintext: &[u8], key: &[u8], context: &[u8]) -> Result<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
    let key = unbound(key).map_err(|reason| VaultError::EncryptionFailed { reason })?;

    let mut nonce = [0u8; NONCE_LEN_BYTES];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "nonce generation failed".into(),
        })?;

    let mut sealing = SealingKey::new(key, OneShot(Some(nonce)));
    let mut buf = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(Aad::from(context), &mut buf)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal failed".into(),
        })?;

    tracing::trace!(len = plaintext.len(), "sealed");
    Ok((nonce, buf))
}

/// Open a value produced by [`seal`] with the same key and context.
pub fn open(nonce: &[u8; NONCE_LEN_BYTES], ciphertext: &[u8], key: &[u8], context: &[u8]) -> Result<Vec<u8>> {
    let key = unbound(key).map_err(|reason| VaultError::DecryptionFailed { reason })?;

    let mut opening = OpeningKey::new(key, OneShot(Some(*nonce)));
    let mut buf = ciphertext.to_vec();
    let plaintext = opening
        .open_in_place(Aad::from(context), &mut buf)
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "authentication failed".into(),
        })?;
    Ok(plaintext.to_vec())
}

/// Stretch `password` into a 256-bit key with PBKDF2-HMAC-SHA256.
pub fn derive_key(password: &[u8], salt: &[u8]) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, PBKDF2_ITERATIONS, salt, password, &mut out);
    out
}

/// Fresh random bytes from the system CSPRNG.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| VaultError::Internal("system random source failed".into()))?;
    Ok(buf)
}

/// A new random master key.
pub fn generate_key() -> Result<Vec<u8>> {
    random_bytes(KEY_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open() {
        let key = generate_key().unwrap();
        let (nonce, sealed) = seal(b"session=abc", &key, b"ns\0k").unwrap();
        assert_eq!(sealed.len(), b"session=abc".len() + TAG_LEN);
        assert_eq!(open(&nonce, &sealed, &key, b"ns\0k").unwrap(), b"session=abc");
    }

    #[test]
    fn wrong_context_fails() {
        let key = generate_key().unwrap();
        let (nonce, sealed) = seal(b"secret", &key, b"a\0k").unwrap();
        assert!(matches!(
            open(&nonce, &sealed, &key, b"b\0k"),
            Err(VaultError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let (nonce, sealed) = seal(b"secret", &generate_key().unwrap(), b"").unwrap();
        assert!(open(&nonce, &sealed, &generate_key().unwrap(), b"").is_err());
    }

    #[test]
    fn short_key_rejected() {
        assert!(matches!(
            seal(b"x", &[0u8; 16], b""),
            Err(VaultError::EncryptionFailed { .. })
        ));
    }

    #[test]
    fn nonces_differ_between_seals() {
        let key = generate_key().unwrap();
        let (a, _) = seal(b"x", &key, b"").unwrap();
        let (b, _) = seal(b"x", &key, b"").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn derive_is_deterministic_per_salt() {
        assert_eq!(derive_key(b"pw", b"salt-1"), derive_key(b"pw", b"salt-1"));
        assert_ne!(derive_key(b"pw", b"salt-1"), derive_key(b"pw", b"salt-2"));
    }
}
