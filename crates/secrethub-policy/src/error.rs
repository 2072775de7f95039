//! Policy error types.
//!
//! A denial is not an error to the evaluator — it is a verdict. Errors
//! here are structural: malformed documents, globs, or conditions, and
//! storage failures from the policy service.

use secrethub_audit::AuditError;
use secrethub_storage::StorageError;
use thiserror::Error;

/// Errors from policy validation, storage, and the service layer.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy document failed schema validation.
    #[error("invalid policy document: {0}")]
    InvalidDocument(String),

    /// A secret glob pattern is malformed.
    #[error("invalid glob pattern {pattern:?}: {reason}")]
    InvalidGlob {
        /// The offending pattern.
        pattern: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A CIDR range is malformed.
    #[error("invalid CIDR range {0:?}")]
    InvalidCidr(String),

    /// A condition value is malformed (time window, weekday, date range).
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    /// The requested policy does not exist.
    #[error("policy not found: {0}")]
    NotFound(String),

    /// A storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An audit append failure; the policy mutation is aborted with it.
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
