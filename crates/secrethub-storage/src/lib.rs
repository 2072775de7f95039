//! SecretHub Storage — durable store and distributed lock.
//!
//! The control plane talks to persistence through the repository traits in
//! [`store`] and the advisory [`lock::LockManager`]. Two backends
//! implement them:
//!
//! - [`MemoryBackend`] / [`lock::MemoryLockManager`] — complete in-process
//!   implementations for tests and single-node development, including
//!   session-loss simulation for failover tests.
//! - [`PgBackend`] / [`postgres::PgLockManager`] — Postgres over sqlx,
//!   with the uniqueness and atomicity contracts expressed as database
//!   constraints and transactions, and locks on `pg_advisory_lock`.
//!
//! The append-only aggregates (vault config, audit events) expose no
//! update-in-place on their traits at all; last-write-wins is impossible
//! by construction.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod lock;
pub mod memory;
pub mod postgres;
pub mod prelude;
pub mod records;
pub mod store;

use std::sync::Arc;

pub use error::{StorageError, StorageResult};
pub use lock::{
    LockGuard, LockHandle, LockInfo, LockManager, LockMode, LockName, MemoryLockManager,
    ReleaseOutcome, acquire, with_lock,
};
pub use memory::MemoryBackend;
pub use postgres::{PgBackend, PgLockManager};
pub use records::{
    AuditEventRecord, AuditQuery, AutoUnsealRecord, HealthSample, LeaseRecord, NodeRecord,
    PolicyRecord, RotationHistoryRecord, SecretFilter, SecretRecord, SecretVersionRecord,
    VaultConfigRecord,
};
pub use store::{
    AuditStore, AutoUnsealStore, HealthStore, LeaseStore, NodeStore, PolicyStore,
    RotationHistoryStore, SecretStore, VaultConfigStore,
};

/// Handles to every repository plus the lock manager, backed by one
/// engine. Cheap to clone; consumers keep only the stores they use.
#[derive(Clone)]
pub struct Storage {
    /// Vault configuration singleton.
    pub vault: Arc<dyn VaultConfigStore>,
    /// Cluster node registry.
    pub nodes: Arc<dyn NodeStore>,
    /// Auto-unseal configuration.
    pub auto_unseal: Arc<dyn AutoUnsealStore>,
    /// Secrets and version chains.
    pub secrets: Arc<dyn SecretStore>,
    /// Policies and bindings.
    pub policies: Arc<dyn PolicyStore>,
    /// Audit chain rows.
    pub audit: Arc<dyn AuditStore>,
    /// Dynamic-credential leases.
    pub leases: Arc<dyn LeaseStore>,
    /// Rotation run history.
    pub rotations: Arc<dyn RotationHistoryStore>,
    /// Node health history.
    pub health: Arc<dyn HealthStore>,
    /// Distributed lock manager.
    pub locks: Arc<dyn LockManager>,
}

impl Storage {
    /// Build a fully in-memory storage stack.
    #[must_use]
    pub fn in_memory() -> Self {
        let backend = Arc::new(MemoryBackend::new());
        Self {
            vault: Arc::clone(&backend) as Arc<dyn VaultConfigStore>,
            nodes: Arc::clone(&backend) as Arc<dyn NodeStore>,
            auto_unseal: Arc::clone(&backend) as Arc<dyn AutoUnsealStore>,
            secrets: Arc::clone(&backend) as Arc<dyn SecretStore>,
            policies: Arc::clone(&backend) as Arc<dyn PolicyStore>,
            audit: Arc::clone(&backend) as Arc<dyn AuditStore>,
            leases: Arc::clone(&backend) as Arc<dyn LeaseStore>,
            rotations: Arc::clone(&backend) as Arc<dyn RotationHistoryStore>,
            health: Arc::clone(&backend) as Arc<dyn HealthStore>,
            locks: Arc::new(MemoryLockManager::new()),
        }
    }

    /// Connect to Postgres, run migrations, and build the storage stack.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the pool or migration
    /// fails.
    pub async fn connect_postgres(url: &str) -> StorageResult<Self> {
        let backend = Arc::new(PgBackend::connect(url).await?);
        let locks = Arc::new(PgLockManager::new(backend.pool().clone()));
        Ok(Self {
            vault: Arc::clone(&backend) as Arc<dyn VaultConfigStore>,
            nodes: Arc::clone(&backend) as Arc<dyn NodeStore>,
            auto_unseal: Arc::clone(&backend) as Arc<dyn AutoUnsealStore>,
            secrets: Arc::clone(&backend) as Arc<dyn SecretStore>,
            policies: Arc::clone(&backend) as Arc<dyn PolicyStore>,
            audit: Arc::clone(&backend) as Arc<dyn AuditStore>,
            leases: Arc::clone(&backend) as Arc<dyn LeaseStore>,
            rotations: Arc::clone(&backend) as Arc<dyn RotationHistoryStore>,
            health: Arc::clone(&backend) as Arc<dyn HealthStore>,
            locks,
        })
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}
