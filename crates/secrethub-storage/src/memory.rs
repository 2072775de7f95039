//! In-memory backend.
//!
//! A complete implementation of every repository trait behind one mutex,
//! which is what makes the multi-row operations genuinely atomic. Used by
//! tests and single-node development; the contracts match the Postgres
//! backend exactly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrethub_core::{EntityId, LeaseId, NodeId, NodeStatus, PolicyId, SecretId, SecretPath};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::records::{
    AuditEventRecord, AuditQuery, AutoUnsealRecord, HealthSample, LeaseRecord, NodeRecord,
    PolicyRecord, RotationHistoryRecord, SecretFilter, SecretRecord, SecretVersionRecord,
    VaultConfigRecord,
};
use crate::store::{
    AuditStore, AutoUnsealStore, HealthStore, LeaseStore, NodeStore, PolicyStore,
    RotationHistoryStore, SecretStore, VaultConfigStore,
};

#[derive(Default)]
struct MemoryData {
    vault: Option<VaultConfigRecord>,
    nodes: HashMap<String, NodeRecord>,
    auto_unseal: Vec<AutoUnsealRecord>,
    secrets: HashMap<Uuid, SecretRecord>,
    secret_paths: HashMap<String, Uuid>,
    versions: HashMap<Uuid, Vec<SecretVersionRecord>>,
    policies: HashMap<Uuid, PolicyRecord>,
    policy_names: HashMap<String, Uuid>,
    audit: BTreeMap<u64, AuditEventRecord>,
    leases: HashMap<Uuid, LeaseRecord>,
    rotations: HashMap<Uuid, RotationHistoryRecord>,
    health: Vec<HealthSample>,
}

/// In-memory implementation of every repository trait.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<MemoryData>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, MemoryData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Test support: mutate one audit event in place, bypassing the
    /// append-only contract. Simulates direct database manipulation for
    /// tamper-detection tests; production code never calls this.
    pub fn tamper_audit_event(
        &self,
        sequence: u64,
        mutate: impl FnOnce(&mut AuditEventRecord),
    ) -> bool {
        let mut data = self.locked();
        match data.audit.get_mut(&sequence) {
            Some(event) => {
                mutate(event);
                true
            },
            None => false,
        }
    }

    /// Test support: delete one audit event, simulating row deletion for
    /// gap-detection tests.
    pub fn delete_audit_event(&self, sequence: u64) -> bool {
        self.locked().audit.remove(&sequence).is_some()
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl VaultConfigStore for MemoryBackend {
    async fn load(&self) -> StorageResult<Option<VaultConfigRecord>> {
        Ok(self.locked().vault.clone())
    }

    async fn initialize(&self, record: VaultConfigRecord) -> StorageResult<()> {
        let mut data = self.locked();
        if data.vault.is_some() {
            return Err(StorageError::AlreadyInitialized);
        }
        data.vault = Some(record);
        Ok(())
    }

    async fn destroy(&self) -> StorageResult<()> {
        self.locked().vault = None;
        Ok(())
    }
}

#[async_trait]
impl NodeStore for MemoryBackend {
    async fn upsert(&self, record: NodeRecord) -> StorageResult<()> {
        self.locked()
            .nodes
            .insert(record.node_id.0.clone(), record);
        Ok(())
    }

    async fn touch(
        &self,
        node_id: &NodeId,
        last_seen_at: DateTime<Utc>,
        status: NodeStatus,
        is_leader: bool,
    ) -> StorageResult<()> {
        let mut data = self.locked();
        let record = data
            .nodes
            .get_mut(&node_id.0)
            .ok_or_else(|| StorageError::NotFound(format!("node {node_id}")))?;
        record.last_seen_at = last_seen_at;
        record.status = status;
        record.is_leader = is_leader;
        Ok(())
    }

    async fn get(&self, node_id: &NodeId) -> StorageResult<Option<NodeRecord>> {
        Ok(self.locked().nodes.get(&node_id.0).cloned())
    }

    async fn list(&self) -> StorageResult<Vec<NodeRecord>> {
        let mut nodes: Vec<NodeRecord> = self.locked().nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.node_id.0.cmp(&b.node_id.0));
        Ok(nodes)
    }

    async fn sweep_stale(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut data = self.locked();
        let before = data.nodes.len();
        data.nodes
            .retain(|_, n| n.last_seen_at >= cutoff || n.status == NodeStatus::Shutdown);
        Ok((before - data.nodes.len()) as u64)
    }

    async fn remove(&self, node_id: &NodeId) -> StorageResult<()> {
        self.locked().nodes.remove(&node_id.0);
        Ok(())
    }
}

#[async_trait]
impl AutoUnsealStore for MemoryBackend {
    async fn active(&self) -> StorageResult<Option<AutoUnsealRecord>> {
        Ok(self
            .locked()
            .auto_unseal
            .iter()
            .find(|r| r.active)
            .cloned())
    }

    async fn activate(&self, record: AutoUnsealRecord) -> StorageResult<()> {
        let mut data = self.locked();
        for existing in &mut data.auto_unseal {
            existing.active = false;
        }
        data.auto_unseal.push(record);
        Ok(())
    }

    async fn deactivate_all(&self) -> StorageResult<()> {
        let mut data = self.locked();
        for existing in &mut data.auto_unseal {
            existing.active = false;
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for MemoryBackend {
    async fn insert(&self, record: SecretRecord) -> StorageResult<()> {
        let mut data = self.locked();
        let path = record.path.as_str().to_string();
        if data.secret_paths.contains_key(&path) {
            return Err(StorageError::Conflict(format!(
                "secret path {path} already exists"
            )));
        }
        data.secret_paths.insert(path, record.id.0);
        data.secrets.insert(record.id.0, record);
        Ok(())
    }

    async fn get(&self, id: SecretId) -> StorageResult<Option<SecretRecord>> {
        Ok(self.locked().secrets.get(&id.0).cloned())
    }

    async fn get_by_path(&self, path: &SecretPath) -> StorageResult<Option<SecretRecord>> {
        let data = self.locked();
        Ok(data
            .secret_paths
            .get(path.as_str())
            .and_then(|id| data.secrets.get(id))
            .cloned())
    }

    async fn archive_then_update(
        &self,
        version: SecretVersionRecord,
        updated: SecretRecord,
    ) -> StorageResult<()> {
        let mut data = self.locked();
        if !data.secrets.contains_key(&updated.id.0) {
            return Err(StorageError::NotFound(format!("secret {}", updated.id)));
        }
        let versions = data.versions.entry(version.secret_id.0).or_default();
        if versions.iter().any(|v| v.version == version.version) {
            return Err(StorageError::Conflict(format!(
                "version {} of secret {} already archived",
                version.version, version.secret_id
            )));
        }
        versions.push(version);
        versions.sort_by_key(|v| v.version);
        data.secrets.insert(updated.id.0, updated);
        Ok(())
    }

    async fn list(&self, filter: SecretFilter) -> StorageResult<Vec<SecretRecord>> {
        let data = self.locked();
        let mut records: Vec<SecretRecord> = data
            .secrets
            .values()
            .filter(|r| {
                filter
                    .secret_type
                    .is_none_or(|t| r.secret_type == t)
                    && filter
                        .path_prefix
                        .as_deref()
                        .is_none_or(|p| r.path.as_str().starts_with(p))
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.path.as_str().cmp(b.path.as_str()));

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, id: SecretId) -> StorageResult<()> {
        let mut data = self.locked();
        let record = data
            .secrets
            .remove(&id.0)
            .ok_or_else(|| StorageError::NotFound(format!("secret {id}")))?;
        data.secret_paths.remove(record.path.as_str());
        data.versions.remove(&id.0);
        Ok(())
    }

    async fn versions(&self, secret_id: SecretId) -> StorageResult<Vec<SecretVersionRecord>> {
        Ok(self
            .locked()
            .versions
            .get(&secret_id.0)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_version(
        &self,
        secret_id: SecretId,
        version: u32,
    ) -> StorageResult<Option<SecretVersionRecord>> {
        Ok(self
            .locked()
            .versions
            .get(&secret_id.0)
            .and_then(|versions| versions.iter().find(|v| v.version == version))
            .cloned())
    }

    async fn delete_versions(&self, secret_id: SecretId, versions: &[u32]) -> StorageResult<u64> {
        let mut data = self.locked();
        let Some(stored) = data.versions.get_mut(&secret_id.0) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|v| !versions.contains(&v.version));
        Ok((before - stored.len()) as u64)
    }

    async fn set_version_count(&self, secret_id: SecretId, count: u32) -> StorageResult<()> {
        let mut data = self.locked();
        let record = data
            .secrets
            .get_mut(&secret_id.0)
            .ok_or_else(|| StorageError::NotFound(format!("secret {secret_id}")))?;
        record.version_count = count;
        Ok(())
    }

    async fn count(&self) -> StorageResult<u64> {
        Ok(self.locked().secrets.len() as u64)
    }
}

#[async_trait]
impl PolicyStore for MemoryBackend {
    async fn insert(&self, record: PolicyRecord) -> StorageResult<()> {
        let mut data = self.locked();
        if data.policy_names.contains_key(&record.name) {
            return Err(StorageError::Conflict(format!(
                "policy {} already exists",
                record.name
            )));
        }
        data.policy_names.insert(record.name.clone(), record.id.0);
        data.policies.insert(record.id.0, record);
        Ok(())
    }

    async fn update(&self, record: PolicyRecord) -> StorageResult<()> {
        let mut data = self.locked();
        let existing = data
            .policies
            .get(&record.id.0)
            .ok_or_else(|| StorageError::NotFound(format!("policy {}", record.id)))?;
        // Renames must not collide with another policy.
        if existing.name != record.name && data.policy_names.contains_key(&record.name) {
            return Err(StorageError::Conflict(format!(
                "policy {} already exists",
                record.name
            )));
        }
        let old_name = existing.name.clone();
        data.policy_names.remove(&old_name);
        data.policy_names.insert(record.name.clone(), record.id.0);
        data.policies.insert(record.id.0, record);
        Ok(())
    }

    async fn get(&self, id: PolicyId) -> StorageResult<Option<PolicyRecord>> {
        Ok(self.locked().policies.get(&id.0).cloned())
    }

    async fn get_by_name(&self, name: &str) -> StorageResult<Option<PolicyRecord>> {
        let data = self.locked();
        Ok(data
            .policy_names
            .get(name)
            .and_then(|id| data.policies.get(id))
            .cloned())
    }

    async fn list(&self) -> StorageResult<Vec<PolicyRecord>> {
        let mut policies: Vec<PolicyRecord> = self.locked().policies.values().cloned().collect();
        policies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(policies)
    }

    async fn delete(&self, id: PolicyId) -> StorageResult<()> {
        let mut data = self.locked();
        let record = data
            .policies
            .remove(&id.0)
            .ok_or_else(|| StorageError::NotFound(format!("policy {id}")))?;
        data.policy_names.remove(&record.name);
        Ok(())
    }

    async fn for_entity(&self, entity: &EntityId) -> StorageResult<Vec<PolicyRecord>> {
        let mut policies: Vec<PolicyRecord> = self
            .locked()
            .policies
            .values()
            .filter(|p| p.entity_bindings.is_empty() || p.entity_bindings.contains(entity))
            .cloned()
            .collect();
        policies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(policies)
    }
}

#[async_trait]
impl AuditStore for MemoryBackend {
    async fn last(&self) -> StorageResult<Option<AuditEventRecord>> {
        Ok(self
            .locked()
            .audit
            .last_key_value()
            .map(|(_, event)| event.clone()))
    }

    async fn append(&self, event: AuditEventRecord) -> StorageResult<()> {
        let mut data = self.locked();
        if data.audit.contains_key(&event.sequence) {
            return Err(StorageError::Conflict(format!(
                "audit sequence {} already written",
                event.sequence
            )));
        }
        data.audit.insert(event.sequence, event);
        Ok(())
    }

    async fn scan(&self, from: u64, limit: usize) -> StorageResult<Vec<AuditEventRecord>> {
        Ok(self
            .locked()
            .audit
            .range(from..)
            .take(limit)
            .map(|(_, event)| event.clone())
            .collect())
    }

    async fn search(&self, query: &AuditQuery) -> StorageResult<Vec<AuditEventRecord>> {
        let data = self.locked();
        let mut matches: Vec<AuditEventRecord> = data
            .audit
            .values()
            .filter(|e| {
                query
                    .event_type
                    .as_deref()
                    .is_none_or(|t| e.event_type == t)
                    && query.actor_type.is_none_or(|t| e.actor_type == t)
                    && query.actor_id.as_deref().is_none_or(|a| e.actor_id == a)
                    && query.secret_id.is_none_or(|s| e.secret_id == Some(s))
                    && query
                        .access_granted
                        .is_none_or(|g| e.access_granted == Some(g))
                    && query
                        .correlation_id
                        .is_none_or(|c| e.correlation_id == Some(c))
                    && query.from.is_none_or(|from| e.timestamp >= from)
                    && query.to.is_none_or(|to| e.timestamp <= to)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.sequence.cmp(&a.sequence)));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(100);
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self) -> StorageResult<u64> {
        Ok(self.locked().audit.len() as u64)
    }
}

#[async_trait]
impl LeaseStore for MemoryBackend {
    async fn insert(&self, record: LeaseRecord) -> StorageResult<()> {
        self.locked().leases.insert(record.id.0, record);
        Ok(())
    }

    async fn get(&self, id: LeaseId) -> StorageResult<Option<LeaseRecord>> {
        Ok(self.locked().leases.get(&id.0).cloned())
    }

    async fn update_expiry(&self, id: LeaseId, expires_at: DateTime<Utc>) -> StorageResult<()> {
        let mut data = self.locked();
        let record = data
            .leases
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::NotFound(format!("lease {id}")))?;
        record.expires_at = expires_at;
        Ok(())
    }

    async fn revoke(&self, id: LeaseId) -> StorageResult<()> {
        let mut data = self.locked();
        let record = data
            .leases
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::NotFound(format!("lease {id}")))?;
        record.revoked = true;
        Ok(())
    }

    async fn delete(&self, id: LeaseId) -> StorageResult<()> {
        self.locked()
            .leases
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("lease {id}")))
    }

    async fn expiring(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<LeaseRecord>> {
        let mut leases: Vec<LeaseRecord> = self
            .locked()
            .leases
            .values()
            .filter(|l| !l.revoked && l.expires_at <= cutoff)
            .cloned()
            .collect();
        leases.sort_by_key(|l| l.expires_at);
        Ok(leases)
    }
}

#[async_trait]
impl RotationHistoryStore for MemoryBackend {
    async fn insert(&self, record: RotationHistoryRecord) -> StorageResult<()> {
        self.locked().rotations.insert(record.id, record);
        Ok(())
    }

    async fn update(&self, record: RotationHistoryRecord) -> StorageResult<()> {
        let mut data = self.locked();
        if !data.rotations.contains_key(&record.id) {
            return Err(StorageError::NotFound(format!("rotation run {}", record.id)));
        }
        data.rotations.insert(record.id, record);
        Ok(())
    }

    async fn for_schedule(&self, schedule_id: Uuid) -> StorageResult<Vec<RotationHistoryRecord>> {
        let mut runs: Vec<RotationHistoryRecord> = self
            .locked()
            .rotations
            .values()
            .filter(|r| r.schedule_id == schedule_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }
}

#[async_trait]
impl HealthStore for MemoryBackend {
    async fn insert(&self, sample: HealthSample) -> StorageResult<()> {
        self.locked().health.push(sample);
        Ok(())
    }

    async fn recent(&self, node_id: &NodeId, limit: usize) -> StorageResult<Vec<HealthSample>> {
        let mut samples: Vec<HealthSample> = self
            .locked()
            .health
            .iter()
            .filter(|s| &s.node_id == node_id)
            .cloned()
            .collect();
        samples.sort_by(|a, b| b.sampled_at.cmp(&a.sampled_at));
        samples.truncate(limit);
        Ok(samples)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut data = self.locked();
        let before = data.health.len();
        data.health.retain(|s| s.sampled_at >= cutoff);
        Ok((before - data.health.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrethub_core::SecretType;

    fn secret(path: &str) -> SecretRecord {
        let now = Utc::now();
        SecretRecord {
            id: SecretId::new(),
            path: SecretPath::parse(path).unwrap(),
            secret_type: SecretType::Static,
            ciphertext: vec![1, 2, 3],
            version: 1,
            version_count: 0,
            last_version_at: None,
            ttl_hint_secs: None,
            rotation: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_vault_config_written_once() {
        let backend = MemoryBackend::new();
        let record = VaultConfigRecord {
            wrapped_master_key: vec![1],
            key_check_value: vec![2],
            threshold: 3,
            total_shares: 5,
            created_at: Utc::now(),
        };

        backend.initialize(record.clone()).await.unwrap();
        assert!(matches!(
            backend.initialize(record).await,
            Err(StorageError::AlreadyInitialized)
        ));
        assert!(VaultConfigStore::load(&backend).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_secret_path_unique() {
        let backend = MemoryBackend::new();
        let secrets: &dyn SecretStore = &backend;
        secrets.insert(secret("prod.db.password")).await.unwrap();
        assert!(matches!(
            secrets.insert(secret("prod.db.password")).await,
            Err(StorageError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_archive_then_update_rejects_duplicate_version() {
        let backend = MemoryBackend::new();
        let secrets: &dyn SecretStore = &backend;
        let record = secret("prod.api.key");
        secrets.insert(record.clone()).await.unwrap();

        let version = SecretVersionRecord {
            id: Uuid::new_v4(),
            secret_id: record.id,
            version: 1,
            ciphertext: record.ciphertext.clone(),
            description: None,
            author: None,
            archived_at: Utc::now(),
        };
        let mut updated = record.clone();
        updated.version = 2;

        secrets
            .archive_then_update(version.clone(), updated.clone())
            .await
            .unwrap();

        // Archiving the same version again must fail and leave the live
        // row untouched.
        let mut updated_again = updated.clone();
        updated_again.version = 3;
        let dup = SecretVersionRecord {
            id: Uuid::new_v4(),
            ..version
        };
        assert!(matches!(
            secrets.archive_then_update(dup, updated_again).await,
            Err(StorageError::Conflict(_))
        ));
        let live = secrets.get(record.id).await.unwrap().unwrap();
        assert_eq!(live.version, 2);
    }

    #[tokio::test]
    async fn test_node_sweep_spares_shutdown() {
        let backend = MemoryBackend::new();
        let old = Utc::now() - chrono::Duration::seconds(60);
        for (id, status) in [
            ("node-a", NodeStatus::Unsealed),
            ("node-b", NodeStatus::Shutdown),
        ] {
            backend
                .upsert(NodeRecord {
                    node_id: NodeId::new(id),
                    hostname: "host".to_string(),
                    status,
                    is_leader: false,
                    started_at: old,
                    last_seen_at: old,
                    version: "0.1.0".to_string(),
                    metadata: serde_json::json!({}),
                })
                .await
                .unwrap();
        }

        let swept = backend
            .sweep_stale(Utc::now() - chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(swept, 1);

        let remaining = NodeStore::list(&backend).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].node_id.as_str(), "node-b");
    }

    #[tokio::test]
    async fn test_auto_unseal_single_active() {
        let backend = MemoryBackend::new();
        let record = |active| AutoUnsealRecord {
            id: Uuid::new_v4(),
            provider: "static".to_string(),
            key_id: None,
            region: None,
            encrypted_shares: vec![],
            max_retries: 3,
            retry_delay_secs: 5,
            active,
            created_at: Utc::now(),
        };

        backend.activate(record(true)).await.unwrap();
        let first = backend.active().await.unwrap().unwrap();

        backend.activate(record(true)).await.unwrap();
        let second = backend.active().await.unwrap().unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_policy_name_unique() {
        let backend = MemoryBackend::new();
        let record = |name: &str| PolicyRecord {
            id: PolicyId::new(),
            name: name.to_string(),
            description: None,
            deny: false,
            document: serde_json::json!({}),
            entity_bindings: vec![],
            max_ttl_secs: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let policies: &dyn PolicyStore = &backend;
        policies.insert(record("readers")).await.unwrap();
        assert!(matches!(
            policies.insert(record("readers")).await,
            Err(StorageError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_policies_for_entity_include_unbound() {
        let backend = MemoryBackend::new();
        let mut bound = PolicyRecord {
            id: PolicyId::new(),
            name: "bound".to_string(),
            description: None,
            deny: false,
            document: serde_json::json!({}),
            entity_bindings: vec![EntityId::new("app-1")],
            max_ttl_secs: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let policies: &dyn PolicyStore = &backend;
        policies.insert(bound.clone()).await.unwrap();
        bound.id = PolicyId::new();
        bound.name = "unbound".to_string();
        bound.entity_bindings = vec![];
        policies.insert(bound).await.unwrap();

        let for_app1 = backend.for_entity(&EntityId::new("app-1")).await.unwrap();
        assert_eq!(for_app1.len(), 2);

        let for_other = backend.for_entity(&EntityId::new("app-2")).await.unwrap();
        assert_eq!(for_other.len(), 1);
        assert_eq!(for_other[0].name, "unbound");
    }

    #[tokio::test]
    async fn test_audit_sequence_unique() {
        let backend = MemoryBackend::new();
        let event = |seq| AuditEventRecord {
            event_id: secrethub_core::EventId::new(),
            sequence: seq,
            timestamp: Utc::now(),
            event_type: "vault.unsealed".to_string(),
            actor_type: secrethub_core::ActorType::System,
            actor_id: "node-a".to_string(),
            secret_id: None,
            secret_version: None,
            access_granted: None,
            policy_name: None,
            denial_reason: None,
            source_ip: None,
            correlation_id: None,
            previous_hash: "GENESIS".to_string(),
            current_hash: "h1".to_string(),
            signature: "s1".to_string(),
        };

        backend.append(event(1)).await.unwrap();
        assert!(matches!(
            backend.append(event(1)).await,
            Err(StorageError::Conflict(_))
        ));
        backend.append(event(2)).await.unwrap();
        assert_eq!(backend.last().await.unwrap().unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_lease_expiring() {
        let backend = MemoryBackend::new();
        let lease = |expires_at, revoked| LeaseRecord {
            id: LeaseId::new(),
            secret_path: SecretPath::parse("prod.db.creds").unwrap(),
            engine_type: "postgres".to_string(),
            credential_ciphertext: vec![0xde, 0xad],
            issued_at: Utc::now(),
            expires_at,
            revoked,
        };

        let leases: &dyn LeaseStore = &backend;
        let past = Utc::now() - chrono::Duration::minutes(5);
        let future = Utc::now() + chrono::Duration::minutes(5);
        leases.insert(lease(past, false)).await.unwrap();
        leases.insert(lease(past, true)).await.unwrap();
        leases.insert(lease(future, false)).await.unwrap();

        let due = backend.expiring(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
    }
}
