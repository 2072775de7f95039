//! Stored record shapes.
//!
//! Plain data structs shared by every backend. Interpretation of the
//! opaque parts (ciphertexts, policy documents, rotation settings) belongs
//! to the crates that own those domains; the storage layer only promises
//! the constraints described on each type.

use chrono::{DateTime, Utc};
use secrethub_core::{
    ActorType, CorrelationId, EntityId, EventId, LeaseId, NodeId, NodeStatus, PolicyId, SecretId,
    SecretPath, SecretType,
};
use serde::{Deserialize, Serialize};

/// The singleton vault configuration, written once by the init-lock
/// holder. Exists iff the cluster is initialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfigRecord {
    /// Master key wrapped by the key-wrapping key (AEAD blob).
    pub wrapped_master_key: Vec<u8>,
    /// `HMAC-SHA256(K, kcv-domain-tag)` used to verify share combines.
    pub key_check_value: Vec<u8>,
    /// Unseal threshold `t`.
    pub threshold: u8,
    /// Total shares `n`.
    pub total_shares: u8,
    /// When the cluster was initialized.
    pub created_at: DateTime<Utc>,
}

/// A registered cluster node. Each node mutates only its own record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Stable node identity.
    pub node_id: NodeId,
    /// Reported hostname.
    pub hostname: String,
    /// Lifecycle status.
    pub status: NodeStatus,
    /// Whether this node currently holds the leader lock.
    pub is_leader: bool,
    /// Process start time.
    pub started_at: DateTime<Utc>,
    /// Last heartbeat time; records older than the node timeout are swept.
    pub last_seen_at: DateTime<Utc>,
    /// Software version string.
    pub version: String,
    /// Free-form metadata surfaced on `/cluster/info`.
    pub metadata: serde_json::Value,
}

/// The optional auto-unseal configuration. At most one row has
/// `active = true`; activation swaps happen atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoUnsealRecord {
    /// Record identity.
    pub id: uuid::Uuid,
    /// KMS provider tag (`static`, `aws`, ...).
    pub provider: String,
    /// Provider-side key identifier.
    pub key_id: Option<String>,
    /// Provider region.
    pub region: Option<String>,
    /// Unseal shares, each independently encrypted by the KMS.
    pub encrypted_shares: Vec<Vec<u8>>,
    /// Attempts before startup auto-unseal gives up.
    pub max_retries: u32,
    /// Delay between attempts in seconds.
    pub retry_delay_secs: u64,
    /// Whether this record drives startup auto-unseal.
    pub active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A live secret. `ciphertext` is non-empty for `static` secrets; the
/// path is unique per cluster; `version` only increases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    /// Record identity.
    pub id: SecretId,
    /// Unique reverse-domain path.
    pub path: SecretPath,
    /// Static or dynamic.
    pub secret_type: SecretType,
    /// AEAD blob of the canonical JSON data.
    pub ciphertext: Vec<u8>,
    /// Current head version number, monotonically increasing.
    pub version: u32,
    /// Number of archived versions currently retained.
    pub version_count: u32,
    /// When the newest archived version was created.
    pub last_version_at: Option<DateTime<Utc>>,
    /// Advisory TTL for consumers, in seconds.
    pub ttl_hint_secs: Option<i64>,
    /// Rotation settings blob, interpreted by the rotation scheduler.
    pub rotation: Option<serde_json::Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// An immutable snapshot of a secret taken before every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretVersionRecord {
    /// Version row identity.
    pub id: uuid::Uuid,
    /// Parent secret.
    pub secret_id: SecretId,
    /// Version number at snapshot time; never reused.
    pub version: u32,
    /// Ciphertext at snapshot time.
    pub ciphertext: Vec<u8>,
    /// Operator-supplied change description.
    pub description: Option<String>,
    /// Who made the change that displaced this version.
    pub author: Option<String>,
    /// When the snapshot was taken.
    pub archived_at: DateTime<Utc>,
}

/// A stored policy. Names are unique; the document is validated by the
/// policy crate before it reaches storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Record identity.
    pub id: PolicyId,
    /// Unique policy name.
    pub name: String,
    /// Human description.
    pub description: Option<String>,
    /// Explicit-deny flag: a matching policy denies instead of allows.
    pub deny: bool,
    /// Policy document (globs, operations, conditions) as JSON.
    pub document: serde_json::Value,
    /// Entities bound to this policy; empty means all entities.
    pub entity_bindings: Vec<EntityId>,
    /// Optional cap on requested TTLs, in seconds.
    pub max_ttl_secs: Option<i64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// One event in the tamper-evident audit chain. Immutable once written;
/// the sequence number is unique and gap-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEventRecord {
    /// Event identity.
    pub event_id: EventId,
    /// Position in the global chain, starting at 1.
    pub sequence: u64,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Dotted event type, e.g. `secret.accessed`.
    pub event_type: String,
    /// Kind of actor.
    pub actor_type: ActorType,
    /// Actor identity string.
    pub actor_id: String,
    /// Affected secret, if any.
    pub secret_id: Option<SecretId>,
    /// Affected secret version, if any.
    pub secret_version: Option<u32>,
    /// Whether access was granted, for access events.
    pub access_granted: Option<bool>,
    /// Name of the policy that decided the outcome.
    pub policy_name: Option<String>,
    /// Denial reason, for denied access.
    pub denial_reason: Option<String>,
    /// Source IP of the request.
    pub source_ip: Option<String>,
    /// Correlation ID threading the request.
    pub correlation_id: Option<CorrelationId>,
    /// `current_hash` of the prior event, or `"GENESIS"`.
    pub previous_hash: String,
    /// SHA-256 of this event's canonical serialization, hex.
    pub current_hash: String,
    /// HMAC-SHA256 signature, hex.
    pub signature: String,
}

/// Search filters for the audit chain. All filters are conjunctive;
/// results are ordered by descending timestamp.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Filter by event type.
    pub event_type: Option<String>,
    /// Filter by actor type.
    pub actor_type: Option<ActorType>,
    /// Filter by actor ID.
    pub actor_id: Option<String>,
    /// Filter by affected secret.
    pub secret_id: Option<SecretId>,
    /// Filter by the access-granted flag.
    pub access_granted: Option<bool>,
    /// Filter by correlation ID.
    pub correlation_id: Option<CorrelationId>,
    /// Inclusive window start.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive window end.
    pub to: Option<DateTime<Utc>>,
    /// Page size (default 100).
    pub limit: Option<usize>,
    /// Page offset.
    pub offset: Option<usize>,
}

/// A dynamic-credential lease owned by the lease manager. The credential
/// ciphertext is opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Lease identity.
    pub id: LeaseId,
    /// Secret path the credentials were issued for.
    pub secret_path: SecretPath,
    /// Issuing engine type string.
    pub engine_type: String,
    /// Opaque encrypted credential payload.
    pub credential_ciphertext: Vec<u8>,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// Expiry; the lease manager schedules revocation at this instant.
    pub expires_at: DateTime<Utc>,
    /// Whether the credentials have been revoked.
    pub revoked: bool,
}

/// One rotation run recorded by the rotation scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationHistoryRecord {
    /// Row identity.
    pub id: uuid::Uuid,
    /// Schedule that triggered the run.
    pub schedule_id: uuid::Uuid,
    /// Rotated secret path.
    pub secret_path: SecretPath,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end, when finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// `running`, `succeeded`, `failed`, or `rolled_back`.
    pub status: String,
    /// Secret version before rotation.
    pub old_version: Option<u32>,
    /// Secret version after rotation.
    pub new_version: Option<u32>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: Option<i64>,
    /// Error string for failed runs.
    pub error: Option<String>,
}

/// A node health sample appended on every heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSample {
    /// Sampled node.
    pub node_id: NodeId,
    /// Sample time.
    pub sampled_at: DateTime<Utc>,
    /// CPU utilization percent.
    pub cpu_percent: f32,
    /// Memory utilization percent.
    pub memory_percent: f32,
    /// Round-trip latency of a store ping, in milliseconds.
    pub db_latency_ms: f64,
    /// Whether the local vault was sealed at sample time.
    pub sealed: bool,
}

/// Filters for secret metadata listings.
#[derive(Debug, Clone, Default)]
pub struct SecretFilter {
    /// Restrict to one secret type.
    pub secret_type: Option<SecretType>,
    /// Restrict to paths beginning with this prefix.
    pub path_prefix: Option<String>,
    /// Page size.
    pub limit: Option<usize>,
    /// Page offset.
    pub offset: Option<usize>,
}
