// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Symmetric encryption and randomness helpers (ring).
//!
//! ## Blob Format
//!
//! ```text
//! nonce (12 bytes) || AES-256-GCM ciphertext || tag (16 bytes)
//! ```
//!
//! The nonce is drawn fresh from the system CSPRNG for every seal. Opening
//! fails on any modification of nonce, ciphertext, tag or associated data.

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a symmetric key in bytes.
pub const KEY_LEN: usize = 32;

/// Errors from the crypto primitives.
///
/// Deliberately opaque: callers map these onto their own domain errors
/// (`DecryptFailed`, `IdentityCorrupt`, ...).
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("system random number generator failed")]
    Rng,

    #[error("invalid key material")]
    InvalidKey,

    #[error("ciphertext rejected (tampered, truncated or wrong key)")]
    Open,

    #[error("encryption failed")]
    Seal,
}

/// 256-bit symmetric key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse key material read from disk.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self(array))
    }

    /// Generate a fresh random key.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_LEN];
        fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn aead_key(&self) -> Result<LessSafeKey, CryptoError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.0).map_err(|_| CryptoError::InvalidKey)?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SymmetricKey").field(&"[REDACTED]").finish()
    }
}

/// Fill `buf` from the system CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    SystemRandom::new().fill(buf).map_err(|_| CryptoError::Rng)
}

/// `len` random bytes.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut buf = vec![0u8; len];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// URL-safe (unpadded base64url) encoding of `entropy_bytes` random bytes.
pub fn random_token(entropy_bytes: usize) -> Result<String, CryptoError> {
    let bytes = random_bytes(entropy_bytes)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Encrypt `plaintext` with a fresh random nonce.
pub fn seal(key: &SymmetricKey, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let aead = key.aead_key()?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    fill_random(&mut nonce_bytes)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    aead.seal_in_place_append_tag(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::Seal)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + in_out.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&in_out);
    Ok(blob)
}

/// Decrypt a blob produced by [`seal`].
pub fn open(key: &SymmetricKey, aad: &[u8], blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < NONCE_LEN + AES_256_GCM.tag_len() {
        return Err(CryptoError::Open);
    }
    let aead = key.aead_key()?;

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| CryptoError::Open)?;

    let mut in_out = ciphertext.to_vec();
    let plaintext = aead
        .open_in_place(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::Open)?;
    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_recovers_plaintext() {
        let key = SymmetricKey::generate().unwrap();
        let blob = seal(&key, b"aad", b"device secret").unwrap();
        assert_eq!(open(&key, b"aad", &blob).unwrap(), b"device secret");
    }

    #[test]
    fn open_rejects_flipped_bit() {
        let key = SymmetricKey::generate().unwrap();
        let mut blob = seal(&key, b"aad", b"payload").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(matches!(open(&key, b"aad", &blob), Err(CryptoError::Open)));
    }

    #[test]
    fn open_rejects_wrong_key_and_wrong_aad() {
        let key = SymmetricKey::generate().unwrap();
        let other = SymmetricKey::generate().unwrap();
        let blob = seal(&key, b"aad", b"payload").unwrap();
        assert!(open(&other, b"aad", &blob).is_err());
        assert!(open(&key, b"other", &blob).is_err());
    }

    #[test]
    fn open_rejects_truncated_blob() {
        let key = SymmetricKey::generate().unwrap();
        assert!(matches!(open(&key, b"", &[0u8; 8]), Err(CryptoError::Open)));
    }

    #[test]
    fn nonces_differ_between_seals() {
        let key = SymmetricKey::generate().unwrap();
        let a = seal(&key, b"", b"same").unwrap();
        let b = seal(&key, b"", b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn random_token_is_url_safe() {
        let token = random_token(32).unwrap();
        // 32 bytes -> 43 unpadded base64url chars
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn key_from_slice_checks_length() {
        assert!(SymmetricKey::from_slice(&[0u8; 16]).is_err());
        assert!(SymmetricKey::from_slice(&[0u8; 32]).is_ok());
    }
}
