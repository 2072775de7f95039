//! Secrets error types.

use secrethub_audit::AuditError;
use secrethub_core::SecretId;
use secrethub_crypto::CryptoError;
use secrethub_policy::PolicyError;
use secrethub_seal::SealError;
use secrethub_storage::StorageError;
use thiserror::Error;

/// Errors from the secrets manager.
#[derive(Debug, Error)]
pub enum SecretsError {
    /// No secret at the given path or ID.
    #[error("secret not found: {0}")]
    NotFound(String),

    /// The policy evaluator denied access; the denial was audited.
    #[error("access denied: {0}")]
    PolicyDenied(String),

    /// The requested archived version does not exist.
    #[error("version {version} of secret {id} not found")]
    VersionNotFound {
        /// Parent secret.
        id: SecretId,
        /// Missing version number.
        version: u32,
    },

    /// Decryption of a stored ciphertext failed. A valid path that no
    /// longer decrypts indicates key corruption; the caller surfaces an
    /// opaque error and must not retry.
    #[error("data integrity failure reading {0}")]
    Integrity(String),

    /// The provided secret data could not be serialized.
    #[error("invalid secret data: {0}")]
    InvalidData(String),

    /// Sealed / not-initialized, from the seal state machine.
    #[error(transparent)]
    Seal(#[from] SealError),

    /// A crypto failure other than AEAD integrity (key length, blob
    /// structure).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A storage failure (including path conflicts).
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An audit append failed; the operation fails with it.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// A policy-layer failure (not a denial).
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Result type for secrets operations.
pub type SecretsResult<T> = Result<T, SecretsError>;
