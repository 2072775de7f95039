//! Repository traits.
//!
//! One trait per aggregate. Backends must be thread-safe and must honor
//! the contracts stated on each method, in particular the atomic
//! multi-row operations (`archive_then_update`, `activate`, `append`) and
//! the unique constraints on secret path, policy name, audit sequence
//! number, and node ID. The audit and vault-config aggregates are
//! append-only: no update-in-place exists on their traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrethub_core::{EntityId, LeaseId, NodeId, NodeStatus, PolicyId, SecretId, SecretPath};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::records::{
    AuditEventRecord, AuditQuery, AutoUnsealRecord, HealthSample, LeaseRecord, NodeRecord,
    PolicyRecord, RotationHistoryRecord, SecretFilter, SecretRecord, SecretVersionRecord,
    VaultConfigRecord,
};

/// The singleton vault configuration.
#[async_trait]
pub trait VaultConfigStore: Send + Sync {
    /// Load the vault config, if the cluster is initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn load(&self) -> StorageResult<Option<VaultConfigRecord>>;

    /// Write the vault config exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::AlreadyInitialized`] if a row exists.
    async fn initialize(&self, record: VaultConfigRecord) -> StorageResult<()>;

    /// Delete the vault config. Only valid during a deliberate re-init of
    /// a destroyed cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn destroy(&self) -> StorageResult<()>;
}

/// Cluster node registry.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Insert or replace a node record (keyed by node ID).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn upsert(&self, record: NodeRecord) -> StorageResult<()>;

    /// Heartbeat update: refresh `last_seen_at`, status, and leader flag.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] for an unknown node.
    async fn touch(
        &self,
        node_id: &NodeId,
        last_seen_at: DateTime<Utc>,
        status: NodeStatus,
        is_leader: bool,
    ) -> StorageResult<()>;

    /// Fetch one node.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get(&self, node_id: &NodeId) -> StorageResult<Option<NodeRecord>>;

    /// List all registered nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn list(&self) -> StorageResult<Vec<NodeRecord>>;

    /// Delete records with `last_seen_at` older than `cutoff` and a status
    /// other than `shutdown`. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn sweep_stale(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;

    /// Remove one node record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn remove(&self, node_id: &NodeId) -> StorageResult<()>;
}

/// Auto-unseal configuration records.
#[async_trait]
pub trait AutoUnsealStore: Send + Sync {
    /// The currently active record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn active(&self) -> StorageResult<Option<AutoUnsealRecord>>;

    /// Insert `record` with `active = true`, deactivating any prior active
    /// row in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn activate(&self, record: AutoUnsealRecord) -> StorageResult<()>;

    /// Deactivate all records (disables auto-unseal).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn deactivate_all(&self) -> StorageResult<()>;
}

/// Secrets and their version chains.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Insert a new secret.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Conflict`] on a duplicate path.
    async fn insert(&self, record: SecretRecord) -> StorageResult<()>;

    /// Fetch by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get(&self, id: SecretId) -> StorageResult<Option<SecretRecord>>;

    /// Fetch by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get_by_path(&self, path: &SecretPath) -> StorageResult<Option<SecretRecord>>;

    /// Atomically archive `version` and replace the live row with
    /// `updated`. If the version insert fails, the live row is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] if the secret is missing
    /// or [`crate::StorageError::Conflict`] on a duplicate version number.
    async fn archive_then_update(
        &self,
        version: SecretVersionRecord,
        updated: SecretRecord,
    ) -> StorageResult<()>;

    /// List secrets matching `filter`, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn list(&self, filter: SecretFilter) -> StorageResult<Vec<SecretRecord>>;

    /// Delete a secret and its versions.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] for an unknown ID.
    async fn delete(&self, id: SecretId) -> StorageResult<()>;

    /// All archived versions of a secret, ascending by version number.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn versions(&self, secret_id: SecretId) -> StorageResult<Vec<SecretVersionRecord>>;

    /// One archived version.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get_version(
        &self,
        secret_id: SecretId,
        version: u32,
    ) -> StorageResult<Option<SecretVersionRecord>>;

    /// Delete the named version rows. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn delete_versions(&self, secret_id: SecretId, versions: &[u32]) -> StorageResult<u64>;

    /// Overwrite the retained-version counter after pruning.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn set_version_count(&self, secret_id: SecretId, count: u32) -> StorageResult<()>;

    /// Total number of secrets.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn count(&self) -> StorageResult<u64>;
}

/// Policies and entity bindings.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Insert a new policy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Conflict`] on a duplicate name.
    async fn insert(&self, record: PolicyRecord) -> StorageResult<()>;

    /// Replace an existing policy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] for an unknown ID.
    async fn update(&self, record: PolicyRecord) -> StorageResult<()>;

    /// Fetch by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get(&self, id: PolicyId) -> StorageResult<Option<PolicyRecord>>;

    /// Fetch by unique name.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get_by_name(&self, name: &str) -> StorageResult<Option<PolicyRecord>>;

    /// List all policies ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn list(&self) -> StorageResult<Vec<PolicyRecord>>;

    /// Delete a policy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] for an unknown ID.
    async fn delete(&self, id: PolicyId) -> StorageResult<()>;

    /// Policies bound to `entity` plus policies with empty bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn for_entity(&self, entity: &EntityId) -> StorageResult<Vec<PolicyRecord>>;
}

/// The append-only audit chain.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// The event with the highest sequence number, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn last(&self) -> StorageResult<Option<AuditEventRecord>>;

    /// Append one event. The unique constraint on `sequence` makes
    /// concurrent appends at the same position fail instead of forking
    /// the chain.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Conflict`] on a duplicate sequence.
    async fn append(&self, event: AuditEventRecord) -> StorageResult<()>;

    /// Events with `sequence >= from`, ascending, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn scan(&self, from: u64, limit: usize) -> StorageResult<Vec<AuditEventRecord>>;

    /// Filtered search ordered by descending timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn search(&self, query: &AuditQuery) -> StorageResult<Vec<AuditEventRecord>>;

    /// Total number of events.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn count(&self) -> StorageResult<u64>;
}

/// Dynamic-credential leases.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Insert a lease.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn insert(&self, record: LeaseRecord) -> StorageResult<()>;

    /// Fetch by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get(&self, id: LeaseId) -> StorageResult<Option<LeaseRecord>>;

    /// Move a lease's expiry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] for an unknown lease.
    async fn update_expiry(&self, id: LeaseId, expires_at: DateTime<Utc>) -> StorageResult<()>;

    /// Mark a lease revoked.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] for an unknown lease.
    async fn revoke(&self, id: LeaseId) -> StorageResult<()>;

    /// Delete a lease.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] for an unknown lease.
    async fn delete(&self, id: LeaseId) -> StorageResult<()>;

    /// Unrevoked leases expiring at or before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn expiring(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<LeaseRecord>>;
}

/// Rotation run history.
#[async_trait]
pub trait RotationHistoryStore: Send + Sync {
    /// Insert a run row (usually in `running` state).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn insert(&self, record: RotationHistoryRecord) -> StorageResult<()>;

    /// Replace a run row (to finish or fail it).
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] for an unknown row.
    async fn update(&self, record: RotationHistoryRecord) -> StorageResult<()>;

    /// Runs for one schedule, descending by start time.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn for_schedule(&self, schedule_id: Uuid) -> StorageResult<Vec<RotationHistoryRecord>>;
}

/// Node health history.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Append a sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn insert(&self, sample: HealthSample) -> StorageResult<()>;

    /// Latest samples for one node, descending, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn recent(&self, node_id: &NodeId, limit: usize) -> StorageResult<Vec<HealthSample>>;

    /// Delete samples older than `cutoff`. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;
}
