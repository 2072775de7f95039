//! HMAC-SHA-256 signing and constant-time verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute `HMAC-SHA256(key, data)`.
///
/// Accepts keys of any length (HMAC hashes long keys internally).
#[must_use]
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Verify `signature == HMAC-SHA256(key, data)` in constant time.
#[must_use]
pub fn hmac_verify(key: &[u8], data: &[u8], signature: &[u8]) -> bool {
    let expected = hmac_sha256(key, data);
    expected.ct_eq(signature).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = hmac_sha256(b"key", b"message");
        let b = hmac_sha256(b"key", b"message");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_key_sensitivity() {
        assert_ne!(hmac_sha256(b"key-a", b"m"), hmac_sha256(b"key-b", b"m"));
    }

    #[test]
    fn test_verify() {
        let sig = hmac_sha256(b"key", b"message");
        assert!(hmac_verify(b"key", b"message", &sig));
        assert!(!hmac_verify(b"key", b"other", &sig));
        assert!(!hmac_verify(b"other", b"message", &sig));
        assert!(!hmac_verify(b"key", b"message", &sig[..31]));
    }
}
