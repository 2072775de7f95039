//! Cluster error types.

use secrethub_audit::AuditError;
use secrethub_seal::SealError;
use secrethub_storage::StorageError;
use thiserror::Error;

/// Errors from cluster coordination.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The `init` lock was not acquired within its timeout. Callers
    /// retry with backoff.
    #[error("init lock timeout")]
    InitLockTimeout,

    /// A seal operation failed during coordinated init or auto-unseal.
    #[error(transparent)]
    Seal(#[from] SealError),

    /// A storage or lock failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An audit append failed; the coordination step is aborted with it.
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;
