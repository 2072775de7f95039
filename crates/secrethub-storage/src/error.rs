//! Storage error types.

use thiserror::Error;

/// Errors from storage and lock operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (duplicate path, name, sequence,
    /// or node ID).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The singleton vault config row already exists.
    #[error("vault already initialized")]
    AlreadyInitialized,

    /// A lock was not acquired within its timeout.
    #[error("lock timeout: {0}")]
    LockTimeout(String),

    /// A release or verify found the lock no longer held by this session.
    #[error("lock not held: {0}")]
    LockNotHeld(String),

    /// Connection to the backend failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Serialization or deserialization of a stored value failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A backend operation failed.
    #[error("storage error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_string())
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                Self::Connection(err.to_string())
            },
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
