//! Symmetric keys with secure memory handling.
//!
//! Keys are fixed-size 256-bit buffers zeroized on drop. They are never
//! serialized, never converted to strings, and their `Debug` output is
//! redacted.

use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// Symmetric key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// A 256-bit symmetric key, zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Generate a fresh key from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Construct from exactly [`KEY_LEN`] bytes.
    ///
    /// The caller keeps responsibility for zeroizing its copy.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] on any other length.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; KEY_LEN];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Derive a key from input material with HKDF-SHA-256.
    ///
    /// `info` provides domain separation; the same material with a
    /// different info string yields an unrelated key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KdfFailure`] if expansion fails.
    pub fn derive(material: &[u8], info: &[u8]) -> CryptoResult<Self> {
        let hk = Hkdf::<Sha256>::new(None, material);
        let mut okm = [0u8; KEY_LEN];
        hk.expand(info, &mut okm)
            .map_err(|_| CryptoError::KdfFailure)?;
        Ok(Self(okm))
    }

    /// The raw key bytes.
    ///
    /// Callers must scope their use narrowly and never copy the bytes
    /// into longer-lived or heap-growing structures.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Whether every byte is zero. Used by zeroization tests.
    #[must_use]
    pub fn is_zeroed(&self) -> bool {
        self.0 == [0u8; KEY_LEN]
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(REDACTED)")
    }
}

/// The cluster's root encryption key protecting all secret ciphertexts.
///
/// Held in memory only while the node is unsealed; the seal state machine
/// zeroizes it on every exit from `unsealed`. A distinct type from
/// [`SymmetricKey`] so that wrapping keys and the master key cannot be
/// interchanged by accident.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    /// Generate a fresh master key from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Construct from exactly [`KEY_LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] on any other length.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; KEY_LEN];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// The raw key bytes, for a single encrypt/decrypt call.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Whether every byte is zero. Used by zeroization tests.
    #[must_use]
    pub fn is_zeroed(&self) -> bool {
        self.0 == [0u8; KEY_LEN]
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(REDACTED)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_random() {
        let a = SymmetricKey::generate();
        let b = SymmetricKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_from_bytes_length() {
        assert!(SymmetricKey::from_bytes(&[0u8; 32]).is_ok());
        assert!(matches!(
            SymmetricKey::from_bytes(&[0u8; 16]),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_derive_is_deterministic() {
        let a = SymmetricKey::derive(b"material", b"context-a").unwrap();
        let b = SymmetricKey::derive(b"material", b"context-a").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_derive_domain_separation() {
        let a = SymmetricKey::derive(b"material", b"context-a").unwrap();
        let b = SymmetricKey::derive(b"material", b"context-b").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_debug_redacts() {
        let key = MasterKey::generate();
        let rendered = format!("{key:?}");
        assert!(!rendered.contains(&hex::encode(key.as_bytes())));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_zeroize_clears_buffer() {
        let mut key = MasterKey::generate();
        assert!(!key.is_zeroed());
        key.zeroize();
        assert!(key.is_zeroed());

        let mut wrapping = SymmetricKey::generate();
        wrapping.zeroize();
        assert!(wrapping.is_zeroed());
    }
}
