//! AEAD encryption into self-describing blobs.
//!
//! Every encryption draws a fresh random 96-bit nonce and packages the
//! result as a byte string that carries everything needed to decrypt it
//! later (given the key):
//!
//! ```text
//! [version:1][nonce:12][tag:16][ciphertext:N]
//! ```
//!
//! The leading version byte keeps the format forward-compatible; the only
//! version today is [`BLOB_VERSION`] (AES-256-GCM).

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::SymmetricKey;

/// Current blob format version (AES-256-GCM).
pub const BLOB_VERSION: u8 = 0x01;

/// Nonce length in bytes.
const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// A parsed encryption blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    /// Format version byte.
    pub version: u8,
    /// Per-operation random nonce.
    pub nonce: [u8; NONCE_LEN],
    /// AEAD authentication tag.
    pub tag: [u8; TAG_LEN],
    /// Ciphertext without the tag.
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Serialize to the wire layout.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + NONCE_LEN + TAG_LEN + self.ciphertext.len());
        out.push(self.version);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the wire layout.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidBlob`] if the input is shorter than
    /// the fixed header, or [`CryptoError::UnsupportedBlobVersion`] for an
    /// unknown version byte.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < 1 + NONCE_LEN + TAG_LEN {
            return Err(CryptoError::InvalidBlob(format!(
                "blob too short: {} bytes",
                bytes.len()
            )));
        }
        let version = bytes[0];
        if version != BLOB_VERSION {
            return Err(CryptoError::UnsupportedBlobVersion(version));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[1..1 + NONCE_LEN]);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&bytes[1 + NONCE_LEN..1 + NONCE_LEN + TAG_LEN]);
        Ok(Self {
            version,
            nonce,
            tag,
            ciphertext: bytes[1 + NONCE_LEN + TAG_LEN..].to_vec(),
        })
    }
}

/// Encrypt `plaintext` under `key` into a self-describing blob.
///
/// # Errors
///
/// Returns [`CryptoError::AeadFailure`] if the cipher rejects the input.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKeyLength {
            expected: crate::keys::KEY_LEN,
            actual: key.as_bytes().len(),
        })?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &[],
            },
        )
        .map_err(|_| CryptoError::AeadFailure)?;

    // aes-gcm appends the tag; the blob layout puts it before the
    // ciphertext, so split it off.
    let split_at = sealed.len().saturating_sub(TAG_LEN);
    let tag_bytes = sealed.split_off(split_at);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&tag_bytes);

    Ok(EncryptedBlob {
        version: BLOB_VERSION,
        nonce,
        tag,
        ciphertext: sealed,
    }
    .to_bytes())
}

/// Decrypt a self-describing blob under `key`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidBlob`]/[`CryptoError::UnsupportedBlobVersion`]
/// for malformed input and [`CryptoError::AeadFailure`] when the
/// authentication tag does not verify (tampered data or wrong key).
pub fn decrypt(key: &SymmetricKey, blob: &[u8]) -> CryptoResult<Vec<u8>> {
    let parsed = EncryptedBlob::from_bytes(blob)?;

    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKeyLength {
            expected: crate::keys::KEY_LEN,
            actual: key.as_bytes().len(),
        })?;

    // Reassemble ciphertext || tag, the layout aes-gcm expects.
    let mut sealed = parsed.ciphertext;
    sealed.extend_from_slice(&parsed.tag);

    cipher
        .decrypt(
            Nonce::from_slice(&parsed.nonce),
            Payload {
                msg: &sealed,
                aad: &[],
            },
        )
        .map_err(|_| CryptoError::AeadFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let key = SymmetricKey::generate();
        let blob = encrypt(&key, b"the quick brown fox").unwrap();
        let plain = decrypt(&key, &blob).unwrap();
        assert_eq!(plain, b"the quick brown fox");
    }

    #[test]
    fn test_blob_layout() {
        let key = SymmetricKey::generate();
        let blob = encrypt(&key, b"payload").unwrap();

        assert_eq!(blob[0], BLOB_VERSION);
        // version + nonce + tag + ciphertext
        assert_eq!(blob.len(), 1 + 12 + 16 + b"payload".len());
    }

    #[test]
    fn test_nonce_is_fresh_per_operation() {
        let key = SymmetricKey::generate();
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[1..13], b[1..13]);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = SymmetricKey::generate();
        let mut blob = encrypt(&key, b"integrity matters").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert_eq!(decrypt(&key, &blob), Err(CryptoError::AeadFailure));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = SymmetricKey::generate();
        let mut blob = encrypt(&key, b"integrity matters").unwrap();
        blob[13] ^= 0x01; // first tag byte
        assert_eq!(decrypt(&key, &blob), Err(CryptoError::AeadFailure));
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = SymmetricKey::generate();
        let other = SymmetricKey::generate();
        let blob = encrypt(&key, b"secret").unwrap();
        assert_eq!(decrypt(&other, &blob), Err(CryptoError::AeadFailure));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let key = SymmetricKey::generate();
        let mut blob = encrypt(&key, b"secret").unwrap();
        blob[0] = 0x7f;
        assert!(matches!(
            decrypt(&key, &blob),
            Err(CryptoError::UnsupportedBlobVersion(0x7f))
        ));
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let key = SymmetricKey::generate();
        assert!(matches!(
            decrypt(&key, &[BLOB_VERSION, 0, 1, 2]),
            Err(CryptoError::InvalidBlob(_))
        ));
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let key = SymmetricKey::generate();
        let blob = encrypt(&key, b"").unwrap();
        assert_eq!(decrypt(&key, &blob).unwrap(), Vec::<u8>::new());
    }
}
