//! Audit error types.

use secrethub_storage::StorageError;
use thiserror::Error;

/// Errors from the audit chain.
#[derive(Debug, Error)]
pub enum AuditError {
    /// No HMAC key was configured and dev mode is off.
    #[error("audit HMAC key not configured (set AUDIT_HMAC_KEY or enable dev_mode)")]
    MissingHmacKey,

    /// An append could not be persisted. The operation that triggered the
    /// event must fail with it.
    #[error("audit write failure: {0}")]
    WriteFailure(String),

    /// The chain does not start at sequence 1.
    #[error("First entry has sequence {0}, expected 1")]
    BadGenesis(u64),

    /// A sequence number is missing.
    #[error("Sequence gap at {found}: expected {expected}")]
    SequenceGap {
        /// The sequence number that should have come next.
        expected: u64,
        /// The sequence number actually found.
        found: u64,
    },

    /// An event's `previous_hash` does not match the prior event.
    #[error("Hash chain broken at sequence {0}")]
    ChainBroken(u64),

    /// An event's HMAC signature does not verify.
    #[error("Invalid signature at sequence {0}")]
    InvalidSignature(u64),

    /// An event's stored hash does not match its recomputed content hash.
    #[error("Hash mismatch at sequence {0}")]
    HashMismatch(u64),

    /// A read-side storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
