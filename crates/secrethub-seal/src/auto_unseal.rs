//! Startup auto-unseal.
//!
//! When enabled, the unseal shares are stored KMS-encrypted in the
//! auto-unseal record; at startup the coordinator decrypts them one by
//! one and replays them through the normal unseal path, under the
//! `auto_unseal` lock so only one node runs the ceremony at a time.

use chrono::Utc;
use secrethub_crypto::UnsealShare;
use secrethub_storage::{
    AutoUnsealRecord, AutoUnsealStore, LockManager, LockName, with_lock,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::actor::SealHandle;
use crate::error::{SealError, SealResult};
use crate::kms::KmsClient;

/// Auto-unseal orchestration over a KMS client and the record store.
pub struct AutoUnseal {
    store: Arc<dyn AutoUnsealStore>,
    kms: Arc<dyn KmsClient>,
    locks: Arc<dyn LockManager>,
}

impl AutoUnseal {
    /// Build the orchestrator.
    #[must_use]
    pub fn new(
        store: Arc<dyn AutoUnsealStore>,
        kms: Arc<dyn KmsClient>,
        locks: Arc<dyn LockManager>,
    ) -> Self {
        Self { store, kms, locks }
    }

    /// Enable auto-unseal: encrypt each share with the KMS and activate a
    /// new record, deactivating any prior one atomically.
    ///
    /// # Errors
    ///
    /// Returns a KMS or storage error; on failure no record is activated.
    pub async fn enable(
        &self,
        shares: &[UnsealShare],
        key_id: Option<String>,
        region: Option<String>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> SealResult<()> {
        let mut encrypted_shares = Vec::with_capacity(shares.len());
        for share in shares {
            encrypted_shares.push(self.kms.encrypt(&share.bytes).await?);
        }

        self.store
            .activate(AutoUnsealRecord {
                id: Uuid::new_v4(),
                provider: self.kms.provider().to_string(),
                key_id,
                region,
                encrypted_shares,
                max_retries,
                retry_delay_secs: retry_delay.as_secs(),
                active: true,
                created_at: Utc::now(),
            })
            .await?;

        info!(provider = self.kms.provider(), "auto-unseal enabled");
        Ok(())
    }

    /// Attempt auto-unseal under the `auto_unseal` lock. Returns whether
    /// the vault ended up unsealed. A vault that is uninitialized, has no
    /// active record, or is already unsealed returns without error.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::AutoUnseal`] after exhausting the record's
    /// retry budget, or lock/storage errors.
    pub async fn run(&self, seal: &SealHandle, lock_timeout: Duration) -> SealResult<bool> {
        let status = seal.status().await?;
        if !status.initialized {
            return Ok(false);
        }
        if !status.sealed {
            return Ok(true);
        }

        let Some(record) = self.store.active().await? else {
            return Ok(false);
        };

        let seal = seal.clone();
        with_lock(
            Arc::clone(&self.locks),
            LockName::AutoUnseal,
            lock_timeout,
            || async move { self.attempt(&seal, &record).await },
        )
        .await
        .map_err(SealError::from)?
    }

    async fn attempt(&self, seal: &SealHandle, record: &AutoUnsealRecord) -> SealResult<bool> {
        let retry_delay = Duration::from_secs(record.retry_delay_secs);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.submit_shares(seal, record).await {
                Ok(true) => {
                    info!(attempt, "auto-unseal complete");
                    return Ok(true);
                },
                Ok(false) => {
                    return Err(SealError::AutoUnseal(
                        "stored shares did not reach the threshold".to_string(),
                    ));
                },
                Err(error) if attempt < record.max_retries => {
                    warn!(attempt, %error, "auto-unseal attempt failed, retrying");
                    tokio::time::sleep(retry_delay).await;
                },
                Err(error) => {
                    return Err(SealError::AutoUnseal(format!(
                        "gave up after {attempt} attempts: {error}"
                    )));
                },
            }
        }
    }

    async fn submit_shares(
        &self,
        seal: &SealHandle,
        record: &AutoUnsealRecord,
    ) -> SealResult<bool> {
        for encrypted in &record.encrypted_shares {
            let bytes = self.kms.decrypt(encrypted).await?;
            let share = UnsealShare::from_bytes(bytes)?;
            let progress = seal.unseal(share).await?;
            if !progress.sealed {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl std::fmt::Debug for AutoUnseal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoUnseal").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{SealConfig, spawn};
    use crate::kms::StaticKms;
    use secrethub_audit::AuditChain;
    use secrethub_core::NodeId;
    use secrethub_storage::Storage;

    fn auto_unseal(storage: &Storage) -> AutoUnseal {
        AutoUnseal::new(
            Arc::clone(&storage.auto_unseal),
            Arc::new(StaticKms::from_material("test-kms-material").unwrap()),
            Arc::clone(&storage.locks),
        )
    }

    fn seal_handle(storage: &Storage) -> SealHandle {
        let audit = Arc::new(AuditChain::new(Arc::clone(&storage.audit), b"test-key"));
        spawn(
            Arc::clone(&storage.vault),
            audit,
            NodeId::new("node-test"),
            SealConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_enable_then_run_unseals() {
        let storage = Storage::in_memory();
        let seal = seal_handle(&storage);
        let auto = auto_unseal(&storage);

        let shares = seal.initialize(3, 5).await.unwrap();
        auto.enable(&shares, None, None, 3, Duration::from_secs(0))
            .await
            .unwrap();

        // Simulate restart: the node is sealed again.
        seal.seal().await.unwrap();

        let unsealed = auto.run(&seal, Duration::from_secs(1)).await.unwrap();
        assert!(unsealed);
        assert!(seal.get_master_key().await.is_ok());
    }

    #[tokio::test]
    async fn test_run_without_record_is_noop() {
        let storage = Storage::in_memory();
        let seal = seal_handle(&storage);
        let auto = auto_unseal(&storage);

        seal.initialize(2, 3).await.unwrap();
        let unsealed = auto.run(&seal, Duration::from_secs(1)).await.unwrap();
        assert!(!unsealed);
    }

    #[tokio::test]
    async fn test_run_uninitialized_is_noop() {
        let storage = Storage::in_memory();
        let seal = seal_handle(&storage);
        let auto = auto_unseal(&storage);

        let unsealed = auto.run(&seal, Duration::from_secs(1)).await.unwrap();
        assert!(!unsealed);
    }

    #[tokio::test]
    async fn test_run_already_unsealed_short_circuits() {
        let storage = Storage::in_memory();
        let seal = seal_handle(&storage);
        let auto = auto_unseal(&storage);

        let shares = seal.initialize(2, 3).await.unwrap();
        seal.unseal(shares[0].clone()).await.unwrap();
        seal.unseal(shares[1].clone()).await.unwrap();

        let unsealed = auto.run(&seal, Duration::from_secs(1)).await.unwrap();
        assert!(unsealed);
    }

    #[tokio::test]
    async fn test_wrong_kms_material_fails() {
        let storage = Storage::in_memory();
        let seal = seal_handle(&storage);

        let enroller = auto_unseal(&storage);
        let shares = seal.initialize(2, 3).await.unwrap();
        enroller
            .enable(&shares, None, None, 1, Duration::from_secs(0))
            .await
            .unwrap();
        seal.seal().await.unwrap();

        // A node configured with different KMS material cannot decrypt
        // the stored shares.
        let misconfigured = AutoUnseal::new(
            Arc::clone(&storage.auto_unseal),
            Arc::new(StaticKms::from_material("other-material").unwrap()),
            Arc::clone(&storage.locks),
        );
        assert!(matches!(
            misconfigured.run(&seal, Duration::from_secs(1)).await,
            Err(SealError::AutoUnseal(_))
        ));
    }
}
