//! Convenience re-exports.

pub use crate::Storage;
pub use crate::error::{StorageError, StorageResult};
pub use crate::lock::{LockGuard, LockManager, LockMode, LockName, acquire, with_lock};
pub use crate::records::{
    AuditEventRecord, AuditQuery, AutoUnsealRecord, HealthSample, LeaseRecord, NodeRecord,
    PolicyRecord, RotationHistoryRecord, SecretFilter, SecretRecord, SecretVersionRecord,
    VaultConfigRecord,
};
pub use crate::store::{
    AuditStore, AutoUnsealStore, HealthStore, LeaseStore, NodeStore, PolicyStore,
    RotationHistoryStore, SecretStore, VaultConfigStore,
};
