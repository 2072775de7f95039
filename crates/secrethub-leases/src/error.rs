//! Lease and rotation error types.

use secrethub_audit::AuditError;
use secrethub_secrets::SecretsError;
use secrethub_storage::StorageError;
use thiserror::Error;

/// Errors from lease persistence and rotation orchestration.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// No lease with the given ID.
    #[error("lease not found: {0}")]
    NotFound(String),

    /// No engine registered for the schedule's type string.
    #[error("unknown rotation engine: {0}")]
    UnknownEngine(String),

    /// The engine reported a rotation failure.
    #[error("rotation failed: {0}")]
    Rotation(String),

    /// A storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A secrets-manager failure while archiving the rotated version.
    #[error(transparent)]
    Secrets(#[from] SecretsError),

    /// An audit append failed; the operation fails with it.
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Result type for lease operations.
pub type LeaseResult<T> = Result<T, LeaseError>;
