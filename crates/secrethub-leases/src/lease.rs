//! Lease persistence for the lease manager.
//!
//! The lease manager owns dynamic-credential lifecycles and revocation
//! scheduling; the core's role is transactional CRUD over opaque
//! credential ciphertexts. Nothing here interprets the payload.

use chrono::{DateTime, Utc};
use secrethub_audit::{AuditActor, AuditChain, AuditEventDraft, AuditEventType};
use secrethub_core::{LeaseId, SecretPath};
use secrethub_storage::{LeaseRecord, LeaseStore, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{LeaseError, LeaseResult};

/// Attributes for issuing a lease.
#[derive(Debug, Clone)]
pub struct IssueLease {
    /// Secret path the credentials were issued for.
    pub secret_path: SecretPath,
    /// Issuing engine type string.
    pub engine_type: String,
    /// Opaque encrypted credential payload.
    pub credential_ciphertext: Vec<u8>,
    /// Lease lifetime from now.
    pub ttl: Duration,
}

/// Transactional CRUD over lease records.
pub struct LeaseService {
    store: Arc<dyn LeaseStore>,
    audit: Arc<AuditChain>,
}

impl LeaseService {
    /// Build a service.
    #[must_use]
    pub fn new(store: Arc<dyn LeaseStore>, audit: Arc<AuditChain>) -> Self {
        Self { store, audit }
    }

    /// Persist a new lease.
    ///
    /// # Errors
    ///
    /// Returns a storage error or an audit write failure.
    pub async fn issue(&self, attrs: IssueLease, actor: &AuditActor) -> LeaseResult<LeaseRecord> {
        let now = Utc::now();
        let record = LeaseRecord {
            id: LeaseId::new(),
            secret_path: attrs.secret_path,
            engine_type: attrs.engine_type,
            credential_ciphertext: attrs.credential_ciphertext,
            issued_at: now,
            expires_at: now
                + chrono::Duration::from_std(attrs.ttl)
                    .unwrap_or_else(|_| chrono::Duration::seconds(0)),
            revoked: false,
        };
        self.store.insert(record.clone()).await?;

        self.audit
            .append(AuditEventDraft::new(
                AuditEventType::LeaseIssued,
                actor.clone(),
            ))
            .await?;

        info!(lease = %record.id, path = %record.secret_path, "lease issued");
        Ok(record)
    }

    /// Look up a lease.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn get(&self, id: LeaseId) -> LeaseResult<Option<LeaseRecord>> {
        Ok(self.store.get(id).await?)
    }

    /// Move a lease's expiry (renewal).
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::NotFound`] for an unknown lease.
    pub async fn set_expiry(&self, id: LeaseId, expires_at: DateTime<Utc>) -> LeaseResult<()> {
        match self.store.update_expiry(id, expires_at).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound(detail)) => Err(LeaseError::NotFound(detail)),
            Err(other) => Err(other.into()),
        }
    }

    /// Mark a lease revoked. The lease manager performs the engine-side
    /// revocation; this records the state.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::NotFound`] or an audit write failure.
    pub async fn revoke(&self, id: LeaseId, actor: &AuditActor) -> LeaseResult<()> {
        match self.store.revoke(id).await {
            Ok(()) => {},
            Err(StorageError::NotFound(detail)) => return Err(LeaseError::NotFound(detail)),
            Err(other) => return Err(other.into()),
        }

        self.audit
            .append(AuditEventDraft::new(
                AuditEventType::LeaseRevoked,
                actor.clone(),
            ))
            .await?;

        info!(lease = %id, "lease revoked");
        Ok(())
    }

    /// Delete a lease record entirely.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::NotFound`].
    pub async fn delete(&self, id: LeaseId) -> LeaseResult<()> {
        match self.store.delete(id).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound(detail)) => Err(LeaseError::NotFound(detail)),
            Err(other) => Err(other.into()),
        }
    }

    /// Unrevoked leases due at or before `cutoff`, for the revocation
    /// scheduler.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn expiring(&self, cutoff: DateTime<Utc>) -> LeaseResult<Vec<LeaseRecord>> {
        Ok(self.store.expiring(cutoff).await?)
    }
}

impl std::fmt::Debug for LeaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrethub_storage::Storage;

    fn service(storage: &Storage) -> LeaseService {
        let audit = Arc::new(AuditChain::new(Arc::clone(&storage.audit), b"test-key"));
        LeaseService::new(Arc::clone(&storage.leases), audit)
    }

    fn issue_attrs() -> IssueLease {
        IssueLease {
            secret_path: SecretPath::parse("prod.db.creds").unwrap(),
            engine_type: "postgres".to_string(),
            credential_ciphertext: vec![0xde, 0xad, 0xbe, 0xef],
            ttl: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn test_issue_and_lookup() {
        let storage = Storage::in_memory();
        let service = service(&storage);

        let record = service
            .issue(issue_attrs(), &AuditActor::system("node-a"))
            .await
            .unwrap();
        assert!(!record.revoked);

        let found = service.get(record.id).await.unwrap().unwrap();
        assert_eq!(found.credential_ciphertext, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[tokio::test]
    async fn test_renew_moves_expiry() {
        let storage = Storage::in_memory();
        let service = service(&storage);
        let record = service
            .issue(issue_attrs(), &AuditActor::system("node-a"))
            .await
            .unwrap();

        let later = record.expires_at + chrono::Duration::hours(1);
        service.set_expiry(record.id, later).await.unwrap();
        assert_eq!(service.get(record.id).await.unwrap().unwrap().expires_at, later);
    }

    #[tokio::test]
    async fn test_revoked_leases_leave_expiring_set() {
        let storage = Storage::in_memory();
        let service = service(&storage);
        let actor = AuditActor::system("node-a");

        let mut attrs = issue_attrs();
        attrs.ttl = Duration::from_secs(0);
        let record = service.issue(attrs, &actor).await.unwrap();

        let due = service.expiring(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);

        service.revoke(record.id, &actor).await.unwrap();
        assert!(service.expiring(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_lease() {
        let storage = Storage::in_memory();
        let service = service(&storage);
        assert!(matches!(
            service.delete(LeaseId::new()).await,
            Err(LeaseError::NotFound(_))
        ));
    }
}
