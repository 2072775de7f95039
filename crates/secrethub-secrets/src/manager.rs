//! The secrets manager.
//!
//! Secret data is canonical JSON, AEAD-encrypted under the master key
//! into a self-describing blob. Every write (create, update, rollback)
//! materializes the resulting state as an immutable version row in the
//! same transaction as the live-row change, so the version chain is the
//! complete history of the secret and version numbers are never reused.
//!
//! Reads come in two shapes: [`SecretsManager::read_decrypted`] for
//! callers that already passed policy (the API layer's responsibility),
//! and [`SecretsManager::read_for_entity`] which evaluates policy and
//! records a `secret.accessed` / `secret.access_denied` audit event for
//! every call. If the access cannot be recorded, the access does not
//! happen.

use chrono::Utc;
use secrethub_audit::{AuditActor, AuditChain, AuditEventDraft, AuditEventType};
use secrethub_core::{CorrelationId, EntityId, Operation, SecretId, SecretPath, SecretType};
use secrethub_crypto::{CryptoError, SymmetricKey};
use secrethub_policy::{EvaluationContext, PolicyService};
use secrethub_seal::SealHandle;
use secrethub_storage::{
    SecretFilter, SecretRecord, SecretStore, SecretVersionRecord, StorageError,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{SecretsError, SecretsResult};

/// Attributes for creating a secret.
#[derive(Debug, Clone)]
pub struct CreateSecret {
    /// Unique reverse-domain path.
    pub path: SecretPath,
    /// The secret data (canonical JSON).
    pub data: serde_json::Value,
    /// Static or dynamic.
    pub secret_type: SecretType,
    /// Advisory TTL for consumers.
    pub ttl_hint: Option<Duration>,
    /// Rotation settings blob for the rotation scheduler.
    pub rotation: Option<serde_json::Value>,
}

impl CreateSecret {
    /// A static secret with just path and data.
    #[must_use]
    pub fn new(path: SecretPath, data: serde_json::Value) -> Self {
        Self {
            path,
            data,
            secret_type: SecretType::Static,
            ttl_hint: None,
            rotation: None,
        }
    }
}

/// Attributes for updating a secret. `None` fields keep current values.
#[derive(Debug, Clone, Default)]
pub struct UpdateSecret {
    /// New data, re-encrypted under the master key.
    pub data: Option<serde_json::Value>,
    /// New TTL hint.
    pub ttl_hint: Option<Duration>,
    /// New rotation settings.
    pub rotation: Option<serde_json::Value>,
}

/// Secret metadata view. Never carries ciphertext or plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretMetadata {
    /// Record identity.
    pub id: SecretId,
    /// Path.
    pub path: SecretPath,
    /// Static or dynamic.
    pub secret_type: SecretType,
    /// Current head version.
    pub version: u32,
    /// Retained version rows.
    pub version_count: u32,
    /// When the newest version row was written.
    pub last_version_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Advisory TTL in seconds.
    pub ttl_hint_secs: Option<i64>,
    /// Creation time.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last mutation time.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&SecretRecord> for SecretMetadata {
    fn from(record: &SecretRecord) -> Self {
        Self {
            id: record.id,
            path: record.path.clone(),
            secret_type: record.secret_type,
            version: record.version,
            version_count: record.version_count,
            last_version_at: record.last_version_at,
            ttl_hint_secs: record.ttl_hint_secs,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Metadata of one archived version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Version number.
    pub version: u32,
    /// Change description.
    pub description: Option<String>,
    /// Author of the change.
    pub author: Option<String>,
    /// When the row was written.
    pub archived_at: chrono::DateTime<chrono::Utc>,
    /// Ciphertext size in bytes.
    pub size: usize,
}

impl From<&SecretVersionRecord> for VersionInfo {
    fn from(record: &SecretVersionRecord) -> Self {
        Self {
            version: record.version,
            description: record.description.clone(),
            author: record.author.clone(),
            archived_at: record.archived_at,
            size: record.ciphertext.len(),
        }
    }
}

/// Metadata comparison of two versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDiff {
    /// The older operand.
    pub a: VersionInfo,
    /// The newer operand.
    pub b: VersionInfo,
    /// `b.size - a.size` in bytes.
    pub size_delta: i64,
}

/// Aggregate statistics over stored secrets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SecretsStats {
    /// Total secrets.
    pub total: u64,
    /// Static secrets.
    pub static_count: u64,
    /// Dynamic secrets.
    pub dynamic_count: u64,
    /// Total retained version rows.
    pub total_versions: u64,
}

/// Request context for a policy-gated read.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    /// Requesting entity.
    pub entity_id: EntityId,
    /// Request source address.
    pub ip_address: Option<IpAddr>,
    /// Requested credential TTL.
    pub requested_ttl: Option<Duration>,
    /// Correlation ID threading the request.
    pub correlation_id: Option<CorrelationId>,
}

impl AccessRequest {
    /// A request with only the entity set.
    #[must_use]
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            ip_address: None,
            requested_ttl: None,
            correlation_id: None,
        }
    }
}

/// Encrypted CRUD with version archive and policy-gated reads.
pub struct SecretsManager {
    store: Arc<dyn SecretStore>,
    seal: SealHandle,
    policies: Arc<PolicyService>,
    audit: Arc<AuditChain>,
}

impl SecretsManager {
    /// Build a manager.
    #[must_use]
    pub fn new(
        store: Arc<dyn SecretStore>,
        seal: SealHandle,
        policies: Arc<PolicyService>,
        audit: Arc<AuditChain>,
    ) -> Self {
        Self {
            store,
            seal,
            policies,
            audit,
        }
    }

    /// Create a secret. Requires `unsealed`; the path must be unique.
    ///
    /// # Errors
    ///
    /// [`SecretsError::Seal`] while sealed, a storage conflict on a
    /// duplicate path, or an audit write failure (the inserted row is
    /// reverted).
    pub async fn create(
        &self,
        attrs: CreateSecret,
        actor: &AuditActor,
    ) -> SecretsResult<SecretMetadata> {
        let ciphertext = self.encrypt_data(&attrs.data).await?;
        let now = Utc::now();

        let record = SecretRecord {
            id: SecretId::new(),
            path: attrs.path,
            secret_type: attrs.secret_type,
            ciphertext: ciphertext.clone(),
            version: 1,
            version_count: 0,
            last_version_at: None,
            ttl_hint_secs: attrs
                .ttl_hint
                .and_then(|ttl| i64::try_from(ttl.as_secs()).ok()),
            rotation: attrs.rotation,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(record.clone()).await?;

        // Materialize version 1 so the chain is the complete history.
        let mut headed = record.clone();
        headed.version_count = 1;
        headed.last_version_at = Some(now);
        self.store
            .archive_then_update(
                SecretVersionRecord {
                    id: Uuid::new_v4(),
                    secret_id: record.id,
                    version: 1,
                    ciphertext,
                    description: Some("created".to_string()),
                    author: Some(actor.actor_id.clone()),
                    archived_at: now,
                },
                headed.clone(),
            )
            .await?;

        if let Err(audit_error) = self
            .audit
            .append(
                AuditEventDraft::new(AuditEventType::SecretCreated, actor.clone())
                    .secret(record.id, Some(1)),
            )
            .await
        {
            // An unrecorded create does not happen.
            let _ = self.store.delete(record.id).await;
            return Err(audit_error.into());
        }

        info!(path = %headed.path, "secret created");
        Ok(SecretMetadata::from(&headed))
    }

    /// Decrypt a secret without policy evaluation. The API layer must
    /// evaluate policy before calling this.
    ///
    /// # Errors
    ///
    /// [`SecretsError::NotFound`], [`SecretsError::Seal`] while sealed,
    /// or [`SecretsError::Integrity`] when the ciphertext no longer
    /// authenticates.
    pub async fn read_decrypted(
        &self,
        path: &SecretPath,
    ) -> SecretsResult<(SecretMetadata, serde_json::Value)> {
        let record = self
            .store
            .get_by_path(path)
            .await?
            .ok_or_else(|| SecretsError::NotFound(path.to_string()))?;
        let data = self.decrypt_record(&record).await?;
        Ok((SecretMetadata::from(&record), data))
    }

    /// Policy-gated read: evaluate the entity's policies, then decrypt.
    /// Every call emits an audit event: `secret.accessed` when granted,
    /// `secret.access_denied` with the denial reason otherwise.
    ///
    /// # Errors
    ///
    /// [`SecretsError::PolicyDenied`] on denial (after the denial is
    /// recorded), [`SecretsError::NotFound`], seal and integrity errors,
    /// or an audit write failure, in which case no data is returned.
    pub async fn read_for_entity(
        &self,
        entity_id: &EntityId,
        path: &SecretPath,
        request: &AccessRequest,
    ) -> SecretsResult<(SecretMetadata, serde_json::Value)> {
        let started = std::time::Instant::now();

        let mut ctx = EvaluationContext::new(entity_id.clone(), path.clone(), Operation::Read);
        ctx.ip_address = request.ip_address;
        ctx.requested_ttl = request.requested_ttl;
        let decision = self.policies.decide(&ctx).await?;

        let record = self.store.get_by_path(path).await?;

        if !decision.allowed {
            let mut draft = AuditEventDraft::new(AuditEventType::SecretAccessDenied, actor_of(entity_id))
                .denied(decision.reason.clone());
            if let Some(record) = &record {
                draft = draft.secret(record.id, Some(record.version));
            }
            if let Some(policy) = &decision.matched_policy {
                draft.policy_name = Some(policy.clone());
            }
            self.audit.append(apply_request(draft, request)).await?;

            debug!(
                path = %path,
                entity = %entity_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "secret access denied"
            );
            return Err(SecretsError::PolicyDenied(decision.reason));
        }

        let Some(record) = record else {
            // Allowed but absent: record the miss, then 404.
            let draft = AuditEventDraft::new(AuditEventType::SecretAccessDenied, actor_of(entity_id))
                .denied("secret not found");
            self.audit.append(apply_request(draft, request)).await?;
            return Err(SecretsError::NotFound(path.to_string()));
        };

        let data = self.decrypt_record(&record).await?;

        // Record the grant before any data leaves this call.
        let mut draft = AuditEventDraft::new(AuditEventType::SecretAccessed, actor_of(entity_id))
            .secret(record.id, Some(record.version));
        draft.access_granted = Some(true);
        draft.policy_name = decision.matched_policy.clone();
        self.audit.append(apply_request(draft, request)).await?;

        debug!(
            path = %path,
            entity = %entity_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "secret access granted"
        );
        Ok((SecretMetadata::from(&record), data))
    }

    /// Update a secret: the new state becomes an immutable version row
    /// and the live row in one transaction. Version numbers only grow.
    ///
    /// # Errors
    ///
    /// [`SecretsError::NotFound`], seal errors when new data must be
    /// encrypted, or an audit write failure.
    pub async fn update(
        &self,
        id: SecretId,
        attrs: UpdateSecret,
        author: &str,
        description: Option<String>,
        actor: &AuditActor,
    ) -> SecretsResult<SecretMetadata> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SecretsError::NotFound(id.to_string()))?;

        let ciphertext = match &attrs.data {
            Some(data) => self.encrypt_data(data).await?,
            None => record.ciphertext.clone(),
        };

        let now = Utc::now();
        let new_version = record.version + 1;
        let mut updated = record.clone();
        updated.ciphertext = ciphertext.clone();
        updated.version = new_version;
        updated.version_count = record.version_count + 1;
        updated.last_version_at = Some(now);
        updated.updated_at = now;
        if let Some(ttl) = attrs.ttl_hint {
            updated.ttl_hint_secs = i64::try_from(ttl.as_secs()).ok();
        }
        if attrs.rotation.is_some() {
            updated.rotation = attrs.rotation;
        }

        self.store
            .archive_then_update(
                SecretVersionRecord {
                    id: Uuid::new_v4(),
                    secret_id: id,
                    version: new_version,
                    ciphertext,
                    description,
                    author: Some(author.to_string()),
                    archived_at: now,
                },
                updated.clone(),
            )
            .await?;

        self.audit
            .append(
                AuditEventDraft::new(AuditEventType::SecretUpdated, actor.clone())
                    .secret(id, Some(new_version)),
            )
            .await?;

        info!(path = %updated.path, version = new_version, "secret updated");
        Ok(SecretMetadata::from(&updated))
    }

    /// Roll back to an archived version by creating a new forward
    /// version whose data equals the target's. The head version number
    /// keeps increasing; numbers are never reused.
    ///
    /// # Errors
    ///
    /// [`SecretsError::NotFound`], [`SecretsError::VersionNotFound`], or
    /// an audit write failure.
    pub async fn rollback(
        &self,
        id: SecretId,
        target_version: u32,
        author: &str,
        actor: &AuditActor,
    ) -> SecretsResult<SecretMetadata> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SecretsError::NotFound(id.to_string()))?;
        let target = self
            .store
            .get_version(id, target_version)
            .await?
            .ok_or(SecretsError::VersionNotFound {
                id,
                version: target_version,
            })?;

        let now = Utc::now();
        let new_version = record.version + 1;
        let mut updated = record.clone();
        updated.ciphertext = target.ciphertext.clone();
        updated.version = new_version;
        updated.version_count = record.version_count + 1;
        updated.last_version_at = Some(now);
        updated.updated_at = now;

        self.store
            .archive_then_update(
                SecretVersionRecord {
                    id: Uuid::new_v4(),
                    secret_id: id,
                    version: new_version,
                    ciphertext: target.ciphertext,
                    description: Some(format!("rollback to version {target_version}")),
                    author: Some(author.to_string()),
                    archived_at: now,
                },
                updated.clone(),
            )
            .await?;

        self.audit
            .append(
                AuditEventDraft::new(AuditEventType::SecretRolledBack, actor.clone())
                    .secret(id, Some(new_version)),
            )
            .await?;

        info!(path = %updated.path, from = target_version, to = new_version, "secret rolled back");
        Ok(SecretMetadata::from(&updated))
    }

    /// Delete a secret and its version chain.
    ///
    /// # Errors
    ///
    /// [`SecretsError::NotFound`] or an audit write failure.
    pub async fn delete(&self, id: SecretId, actor: &AuditActor) -> SecretsResult<()> {
        match self.store.delete(id).await {
            Ok(()) => {},
            Err(StorageError::NotFound(detail)) => return Err(SecretsError::NotFound(detail)),
            Err(other) => return Err(other.into()),
        }

        self.audit
            .append(AuditEventDraft::new(AuditEventType::SecretDeleted, actor.clone()).secret(id, None))
            .await?;

        info!(secret_id = %id, "secret deleted");
        Ok(())
    }

    /// Prune archived versions: keep the newest `keep_last` and anything
    /// younger than `keep_days`. Returns how many rows were deleted.
    ///
    /// # Errors
    ///
    /// [`SecretsError::NotFound`] or a storage failure.
    pub async fn prune_versions(
        &self,
        id: SecretId,
        keep_last: u32,
        keep_days: i64,
    ) -> SecretsResult<u64> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SecretsError::NotFound(id.to_string()))?;

        let mut versions = self.store.versions(id).await?;
        versions.sort_by(|a, b| b.version.cmp(&a.version));

        let age_cutoff = Utc::now() - chrono::Duration::days(keep_days);
        let deletable: Vec<u32> = versions
            .iter()
            .skip(keep_last as usize)
            .filter(|v| v.archived_at < age_cutoff)
            .map(|v| v.version)
            .collect();

        if deletable.is_empty() {
            return Ok(0);
        }

        let deleted = self.store.delete_versions(id, &deletable).await?;
        let remaining = record.version_count.saturating_sub(u32::try_from(deleted).unwrap_or(0));
        self.store.set_version_count(id, remaining).await?;

        info!(secret_id = %id, deleted, "versions pruned");
        Ok(deleted)
    }

    /// List the archived versions of a secret, ascending.
    ///
    /// # Errors
    ///
    /// Returns a storage failure.
    pub async fn list_versions(&self, id: SecretId) -> SecretsResult<Vec<VersionInfo>> {
        Ok(self
            .store
            .versions(id)
            .await?
            .iter()
            .map(VersionInfo::from)
            .collect())
    }

    /// Decrypt one archived version.
    ///
    /// # Errors
    ///
    /// [`SecretsError::VersionNotFound`], seal errors, or
    /// [`SecretsError::Integrity`].
    pub async fn read_version(
        &self,
        id: SecretId,
        version: u32,
    ) -> SecretsResult<serde_json::Value> {
        let target = self
            .store
            .get_version(id, version)
            .await?
            .ok_or(SecretsError::VersionNotFound { id, version })?;
        self.decrypt_bytes(&target.ciphertext, &format!("{id}@v{version}"))
            .await
    }

    /// Compare two versions' metadata: sizes, authors, descriptions.
    /// No decryption happens.
    ///
    /// # Errors
    ///
    /// [`SecretsError::VersionNotFound`] for either operand.
    pub async fn compare_versions(
        &self,
        id: SecretId,
        a: u32,
        b: u32,
    ) -> SecretsResult<VersionDiff> {
        let version_a = self
            .store
            .get_version(id, a)
            .await?
            .ok_or(SecretsError::VersionNotFound { id, version: a })?;
        let version_b = self
            .store
            .get_version(id, b)
            .await?
            .ok_or(SecretsError::VersionNotFound { id, version: b })?;

        let info_a = VersionInfo::from(&version_a);
        let info_b = VersionInfo::from(&version_b);
        let size_delta = info_b.size as i64 - info_a.size as i64;
        Ok(VersionDiff {
            a: info_a,
            b: info_b,
            size_delta,
        })
    }

    /// Metadata listing; no decryption.
    ///
    /// # Errors
    ///
    /// Returns a storage failure.
    pub async fn list(&self, filter: SecretFilter) -> SecretsResult<Vec<SecretMetadata>> {
        Ok(self
            .store
            .list(filter)
            .await?
            .iter()
            .map(SecretMetadata::from)
            .collect())
    }

    /// Aggregate statistics; no decryption.
    ///
    /// # Errors
    ///
    /// Returns a storage failure.
    pub async fn stats(&self) -> SecretsResult<SecretsStats> {
        let all = self.store.list(SecretFilter::default()).await?;
        let static_count = all
            .iter()
            .filter(|r| r.secret_type == SecretType::Static)
            .count() as u64;
        let total_versions = all.iter().map(|r| u64::from(r.version_count)).sum();
        Ok(SecretsStats {
            total: all.len() as u64,
            static_count,
            dynamic_count: all.len() as u64 - static_count,
            total_versions,
        })
    }

    async fn encrypt_data(&self, data: &serde_json::Value) -> SecretsResult<Vec<u8>> {
        let plaintext =
            serde_json::to_vec(data).map_err(|e| SecretsError::InvalidData(e.to_string()))?;
        let key = self.data_key().await?;
        Ok(secrethub_crypto::encrypt(&key, &plaintext)?)
    }

    async fn decrypt_record(&self, record: &SecretRecord) -> SecretsResult<serde_json::Value> {
        self.decrypt_bytes(&record.ciphertext, record.path.as_str())
            .await
    }

    async fn decrypt_bytes(
        &self,
        ciphertext: &[u8],
        context: &str,
    ) -> SecretsResult<serde_json::Value> {
        let key = self.data_key().await?;
        let plaintext = match secrethub_crypto::decrypt(&key, ciphertext) {
            Ok(plaintext) => plaintext,
            Err(CryptoError::AeadFailure) => {
                return Err(SecretsError::Integrity(context.to_string()));
            },
            Err(other) => return Err(other.into()),
        };
        serde_json::from_slice(&plaintext).map_err(|e| SecretsError::InvalidData(e.to_string()))
    }

    async fn data_key(&self) -> SecretsResult<SymmetricKey> {
        let master = self.seal.get_master_key().await?;
        Ok(SymmetricKey::from_bytes(master.as_bytes())?)
    }
}

impl std::fmt::Debug for SecretsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsManager").finish_non_exhaustive()
    }
}

fn actor_of(entity_id: &EntityId) -> AuditActor {
    AuditActor::application(entity_id.as_str())
}

fn apply_request(mut draft: AuditEventDraft, request: &AccessRequest) -> AuditEventDraft {
    if let Some(ip) = request.ip_address {
        draft.source_ip = Some(ip.to_string());
    }
    draft.correlation_id = request.correlation_id;
    draft
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrethub_core::NodeId;
    use secrethub_policy::{PolicyAttrs, PolicyDocument, PolicyEvaluator};
    use secrethub_seal::SealConfig;
    use secrethub_storage::Storage;

    struct Stack {
        manager: SecretsManager,
        policies: Arc<PolicyService>,
        storage: Storage,
        seal: SealHandle,
    }

    async fn unsealed_stack() -> Stack {
        let storage = Storage::in_memory();
        let audit = Arc::new(AuditChain::new(Arc::clone(&storage.audit), b"test-key"));
        let seal = secrethub_seal::spawn(
            Arc::clone(&storage.vault),
            Arc::clone(&audit),
            NodeId::new("node-test"),
            SealConfig::default(),
        );
        let shares = seal.initialize(2, 3).await.unwrap();
        seal.unseal(shares[0].clone()).await.unwrap();
        seal.unseal(shares[1].clone()).await.unwrap();

        let policies = Arc::new(PolicyService::new(
            Arc::clone(&storage.policies),
            Arc::new(PolicyEvaluator::new(Duration::from_secs(300))),
            Arc::clone(&audit),
        ));
        let manager = SecretsManager::new(
            Arc::clone(&storage.secrets),
            seal.clone(),
            Arc::clone(&policies),
            audit,
        );
        Stack {
            manager,
            policies,
            storage,
            seal,
        }
    }

    fn admin() -> AuditActor {
        AuditActor::admin("ops")
    }

    fn path(p: &str) -> SecretPath {
        SecretPath::parse(p).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let stack = unsealed_stack().await;
        let meta = stack
            .manager
            .create(
                CreateSecret::new(path("dev.x"), serde_json::json!({"v": 1})),
                &admin(),
            )
            .await
            .unwrap();
        assert_eq!(meta.version, 1);
        assert_eq!(meta.version_count, 1);

        let (read_meta, data) = stack.manager.read_decrypted(&path("dev.x")).await.unwrap();
        assert_eq!(read_meta.id, meta.id);
        assert_eq!(data, serde_json::json!({"v": 1}));
    }

    #[tokio::test]
    async fn test_duplicate_path_conflicts() {
        let stack = unsealed_stack().await;
        let create = CreateSecret::new(path("dev.x"), serde_json::json!({}));
        stack.manager.create(create.clone(), &admin()).await.unwrap();
        assert!(matches!(
            stack.manager.create(create, &admin()).await,
            Err(SecretsError::Storage(StorageError::Conflict(_)))
        ));
    }

    #[tokio::test]
    async fn test_sealed_vault_blocks_operations() {
        let stack = unsealed_stack().await;
        stack.seal.seal().await.unwrap();

        assert!(matches!(
            stack
                .manager
                .create(
                    CreateSecret::new(path("dev.x"), serde_json::json!({})),
                    &admin()
                )
                .await,
            Err(SecretsError::Seal(secrethub_seal::SealError::Sealed))
        ));
    }

    #[tokio::test]
    async fn test_update_archives_and_bumps_version() {
        let stack = unsealed_stack().await;
        let meta = stack
            .manager
            .create(
                CreateSecret::new(path("dev.x"), serde_json::json!({"v": 1})),
                &admin(),
            )
            .await
            .unwrap();

        let updated = stack
            .manager
            .update(
                meta.id,
                UpdateSecret {
                    data: Some(serde_json::json!({"v": 2})),
                    ..UpdateSecret::default()
                },
                "ops",
                Some("bump".to_string()),
                &admin(),
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.version_count, 2);

        let versions = stack.manager.list_versions(meta.id).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 1);
        assert_eq!(versions[1].version, 2);

        // The archived first version still decrypts to the old data.
        let old = stack.manager.read_version(meta.id, 1).await.unwrap();
        assert_eq!(old, serde_json::json!({"v": 1}));
    }

    #[tokio::test]
    async fn test_rollback_is_additive() {
        // Create, update twice, then roll back to the first version: the
        // head keeps moving forward and old data comes back verbatim.
        let stack = unsealed_stack().await;
        let meta = stack
            .manager
            .create(
                CreateSecret::new(path("dev.x"), serde_json::json!({"v": 1})),
                &admin(),
            )
            .await
            .unwrap();

        for v in 2..=3 {
            stack
                .manager
                .update(
                    meta.id,
                    UpdateSecret {
                        data: Some(serde_json::json!({"v": v})),
                        ..UpdateSecret::default()
                    },
                    "ops",
                    None,
                    &admin(),
                )
                .await
                .unwrap();
        }

        let rolled = stack
            .manager
            .rollback(meta.id, 1, "ops", &admin())
            .await
            .unwrap();
        assert_eq!(rolled.version, 4);

        let (_, data) = stack.manager.read_decrypted(&path("dev.x")).await.unwrap();
        assert_eq!(data, serde_json::json!({"v": 1}));

        let versions = stack.manager.list_versions(meta.id).await.unwrap();
        assert_eq!(versions.len(), 4);
    }

    #[tokio::test]
    async fn test_rollback_to_missing_version_fails() {
        let stack = unsealed_stack().await;
        let meta = stack
            .manager
            .create(
                CreateSecret::new(path("dev.x"), serde_json::json!({"v": 1})),
                &admin(),
            )
            .await
            .unwrap();

        assert!(matches!(
            stack.manager.rollback(meta.id, 99, "ops", &admin()).await,
            Err(SecretsError::VersionNotFound { version: 99, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_for_entity_allowed_and_audited() {
        let stack = unsealed_stack().await;
        stack
            .policies
            .create(
                PolicyAttrs {
                    name: "readers".to_string(),
                    description: None,
                    deny: false,
                    document: PolicyDocument::read_only(vec!["prod.db.**".to_string()]),
                    entity_bindings: vec![],
                    max_ttl: None,
                },
                &admin(),
            )
            .await
            .unwrap();
        stack
            .manager
            .create(
                CreateSecret::new(path("prod.db.password"), serde_json::json!({"pw": "hunter2"})),
                &admin(),
            )
            .await
            .unwrap();

        let (_, data) = stack
            .manager
            .read_for_entity(
                &EntityId::new("app-1"),
                &path("prod.db.password"),
                &AccessRequest::new(EntityId::new("app-1")),
            )
            .await
            .unwrap();
        assert_eq!(data, serde_json::json!({"pw": "hunter2"}));

        let events = stack.storage.audit.scan(0, 100).await.unwrap();
        let accessed: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == "secret.accessed")
            .collect();
        assert_eq!(accessed.len(), 1);
        assert_eq!(accessed[0].access_granted, Some(true));
        assert_eq!(accessed[0].policy_name.as_deref(), Some("readers"));
    }

    #[tokio::test]
    async fn test_read_for_entity_denied_and_audited() {
        let stack = unsealed_stack().await;
        stack
            .manager
            .create(
                CreateSecret::new(path("prod.db.password"), serde_json::json!({})),
                &admin(),
            )
            .await
            .unwrap();

        let result = stack
            .manager
            .read_for_entity(
                &EntityId::new("app-1"),
                &path("prod.db.password"),
                &AccessRequest::new(EntityId::new("app-1")),
            )
            .await;
        assert!(matches!(result, Err(SecretsError::PolicyDenied(reason)) if reason == "no policy allows access"));

        let events = stack.storage.audit.scan(0, 100).await.unwrap();
        let denied: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == "secret.access_denied")
            .collect();
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].access_granted, Some(false));
        assert_eq!(
            denied[0].denial_reason.as_deref(),
            Some("no policy allows access")
        );
    }

    #[tokio::test]
    async fn test_prune_versions_keeps_recent_and_last_k() {
        let stack = unsealed_stack().await;
        let meta = stack
            .manager
            .create(
                CreateSecret::new(path("dev.x"), serde_json::json!({"v": 1})),
                &admin(),
            )
            .await
            .unwrap();
        for v in 2..=6 {
            stack
                .manager
                .update(
                    meta.id,
                    UpdateSecret {
                        data: Some(serde_json::json!({"v": v})),
                        ..UpdateSecret::default()
                    },
                    "ops",
                    None,
                    &admin(),
                )
                .await
                .unwrap();
        }

        // All six rows are fresh: nothing is old enough to prune.
        assert_eq!(stack.manager.prune_versions(meta.id, 2, 30).await.unwrap(), 0);

        // With a zero-day window, only the keep-last guard protects rows.
        let deleted = stack.manager.prune_versions(meta.id, 2, -1).await.unwrap();
        assert_eq!(deleted, 4);

        let versions = stack.manager.list_versions(meta.id).await.unwrap();
        let numbers: Vec<u32> = versions.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![5, 6]);
    }

    #[tokio::test]
    async fn test_compare_versions() {
        let stack = unsealed_stack().await;
        let meta = stack
            .manager
            .create(
                CreateSecret::new(path("dev.x"), serde_json::json!({"v": 1})),
                &admin(),
            )
            .await
            .unwrap();
        stack
            .manager
            .update(
                meta.id,
                UpdateSecret {
                    data: Some(serde_json::json!({"v": 2, "extra": "payload"})),
                    ..UpdateSecret::default()
                },
                "alice",
                Some("grew".to_string()),
                &admin(),
            )
            .await
            .unwrap();

        let diff = stack.manager.compare_versions(meta.id, 1, 2).await.unwrap();
        assert_eq!(diff.a.version, 1);
        assert_eq!(diff.b.version, 2);
        assert!(diff.size_delta > 0);
        assert_eq!(diff.b.author.as_deref(), Some("alice"));
        assert_eq!(diff.b.description.as_deref(), Some("grew"));
    }

    #[tokio::test]
    async fn test_list_and_stats_expose_no_ciphertext() {
        let stack = unsealed_stack().await;
        stack
            .manager
            .create(
                CreateSecret::new(path("dev.a"), serde_json::json!({"k": "v"})),
                &admin(),
            )
            .await
            .unwrap();
        stack
            .manager
            .create(
                CreateSecret {
                    path: path("dev.b"),
                    data: serde_json::json!({}),
                    secret_type: SecretType::Dynamic,
                    ttl_hint: Some(Duration::from_secs(600)),
                    rotation: None,
                },
                &admin(),
            )
            .await
            .unwrap();

        let listed = stack.manager.list(SecretFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 2);

        let stats = stack.manager.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.static_count, 1);
        assert_eq!(stats.dynamic_count, 1);
        assert_eq!(stats.total_versions, 2);
    }
}
