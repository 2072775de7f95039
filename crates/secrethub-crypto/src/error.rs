//! Crypto error types.

use thiserror::Error;

/// Errors from cryptographic operations.
///
/// Variants carry no key material and no plaintext; messages are safe to
/// surface to operators and logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Key material had the wrong length.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes.
        expected: usize,
        /// Supplied length in bytes.
        actual: usize,
    },

    /// AEAD decryption failed (tag mismatch: tampered or wrong key).
    #[error("aead failure: ciphertext authentication failed")]
    AeadFailure,

    /// An encryption blob failed structural parsing.
    #[error("invalid encryption blob: {0}")]
    InvalidBlob(String),

    /// An encryption blob carried an unsupported version byte.
    #[error("unsupported blob version {0:#04x}")]
    UnsupportedBlobVersion(u8),

    /// A threshold share failed structural checks.
    #[error("invalid share: {0}")]
    InvalidShare(String),

    /// Fewer than `threshold` distinct valid shares were supplied.
    #[error("insufficient shares: have {have}, need {need}")]
    InsufficientShares {
        /// Distinct valid shares supplied.
        have: usize,
        /// Threshold required.
        need: usize,
    },

    /// Combining an admissible share set produced a bad result.
    #[error("reconstruction failed: combined secret did not verify")]
    ReconstructionFailed,

    /// A `(threshold, total)` pair was outside `1 ≤ t ≤ n ≤ 255`.
    #[error("invalid threshold config: threshold {threshold}, total {total}")]
    InvalidThresholdConfig {
        /// Requested threshold.
        threshold: u16,
        /// Requested total shares.
        total: u16,
    },

    /// HKDF expansion failed (requested output too long).
    #[error("key derivation failed")]
    KdfFailure,
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
