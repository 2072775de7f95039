//! Seal error types.

use secrethub_audit::AuditError;
use secrethub_crypto::CryptoError;
use secrethub_storage::StorageError;
use thiserror::Error;

/// Errors from the seal state machine.
#[derive(Debug, Error)]
pub enum SealError {
    /// The operation needs the master key but the vault is sealed.
    #[error("vault is sealed")]
    Sealed,

    /// The vault has never been initialized.
    #[error("vault is not initialized")]
    NotInitialized,

    /// Initialization was attempted on an initialized vault.
    #[error("vault is already initialized")]
    AlreadyInitialized,

    /// A crypto-layer failure: invalid share, insufficient shares,
    /// reconstruction failure, AEAD failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The seal actor is gone (process shutting down).
    #[error("seal subsystem unavailable")]
    Unavailable,

    /// A storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An audit append failed; the seal transition it would have recorded
    /// was rolled back.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Auto-unseal could not complete.
    #[error("auto-unseal failed: {0}")]
    AutoUnseal(String),

    /// A KMS call failed.
    #[error("kms failure: {0}")]
    Kms(String),
}

/// Result type for seal operations.
pub type SealResult<T> = Result<T, SealError>;
