//! Process wiring: one [`Node`] assembles the whole control plane from a
//! [`CoreConfig`]. The binary and the integration tests share it.

use secrethub_audit::{AuditChain, AuditError};
use secrethub_cluster::{ClusterConfig, ClusterCoordinator, NodeIdentity};
use secrethub_core::CoreConfig;
use secrethub_leases::LeaseService;
use secrethub_policy::{PolicyEvaluator, PolicyService};
use secrethub_seal::{AutoUnseal, SealConfig, SealError, SealHandle, StaticKms};
use secrethub_secrets::SecretsManager;
use secrethub_storage::{Storage, StorageError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::AppState;

/// Errors while assembling or starting a node.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The storage backend could not be prepared.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The audit chain could not be configured (missing HMAC key).
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Auto-unseal configuration is inconsistent.
    #[error("auto-unseal misconfigured: {0}")]
    AutoUnseal(String),

    /// A seal-layer failure during startup.
    #[error(transparent)]
    Seal(#[from] SealError),

    /// A cluster-layer failure during startup.
    #[error(transparent)]
    Cluster(#[from] secrethub_cluster::ClusterError),
}

/// One assembled control-plane node.
pub struct Node {
    /// Runtime configuration.
    pub config: CoreConfig,
    /// Storage handles.
    pub storage: Storage,
    /// Audit chain.
    pub audit: Arc<AuditChain>,
    /// Seal actor handle.
    pub seal: SealHandle,
    /// Cluster coordinator.
    pub coordinator: Arc<ClusterCoordinator>,
    /// Policy service.
    pub policies: Arc<PolicyService>,
    /// Secrets manager.
    pub secrets: Arc<SecretsManager>,
    /// Lease service.
    pub leases: Arc<LeaseService>,
    /// Auto-unseal orchestrator, when KMS material is configured.
    pub auto_unseal: Option<Arc<AutoUnseal>>,
    version: String,
}

impl Node {
    /// Assemble a node: connect storage, configure the audit chain,
    /// spawn the seal actor, and build every service on top.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if storage cannot be reached, the audit
    /// key policy is violated, or auto-unseal is misconfigured.
    pub async fn build(config: CoreConfig) -> Result<Self, BuildError> {
        let storage = match &config.database.url {
            Some(url) => {
                info!("connecting to postgres backend");
                Storage::connect_postgres(url).await?
            },
            None => {
                warn!("no DATABASE_URL configured, using the in-memory backend");
                Storage::in_memory()
            },
        };

        let audit = Arc::new(AuditChain::from_config(
            Arc::clone(&storage.audit),
            &config.audit,
        )?);

        let version = env!("CARGO_PKG_VERSION").to_string();
        let identity = NodeIdentity::generate(version.clone());
        info!(node = %identity.node_id, "node identity generated");

        let seal = secrethub_seal::spawn(
            Arc::clone(&storage.vault),
            Arc::clone(&audit),
            identity.node_id.clone(),
            SealConfig {
                auto_seal_after: config.seal.auto_seal_after(),
            },
        );

        let coordinator = ClusterCoordinator::new(
            identity,
            Arc::clone(&storage.nodes),
            Arc::clone(&storage.health),
            Arc::clone(&storage.vault),
            Arc::clone(&storage.locks),
            seal.clone(),
            Arc::clone(&audit),
            ClusterConfig::from_core(&config),
        );

        let policies = Arc::new(PolicyService::new(
            Arc::clone(&storage.policies),
            Arc::new(PolicyEvaluator::new(Duration::from_secs(
                config.policy.cache_ttl_secs,
            ))),
            Arc::clone(&audit),
        ));

        let secrets = Arc::new(SecretsManager::new(
            Arc::clone(&storage.secrets),
            seal.clone(),
            Arc::clone(&policies),
            Arc::clone(&audit),
        ));

        let leases = Arc::new(LeaseService::new(
            Arc::clone(&storage.leases),
            Arc::clone(&audit),
        ));

        let auto_unseal = match (&config.kms.encryption_key, config.kms.auto_unseal_enabled) {
            (Some(material), _) => {
                if config.kms.provider != "static" {
                    return Err(BuildError::AutoUnseal(format!(
                        "provider {:?} has no in-tree connector",
                        config.kms.provider
                    )));
                }
                let kms = Arc::new(StaticKms::from_material(material)?);
                Some(Arc::new(AutoUnseal::new(
                    Arc::clone(&storage.auto_unseal),
                    kms,
                    Arc::clone(&storage.locks),
                )))
            },
            (None, true) => {
                return Err(BuildError::AutoUnseal(
                    "AUTO_UNSEAL_ENABLED is set but ENCRYPTION_KEY is not".to_string(),
                ));
            },
            (None, false) => None,
        };

        Ok(Self {
            config,
            storage,
            audit,
            seal,
            coordinator,
            policies,
            secrets,
            leases,
            auto_unseal,
            version,
        })
    }

    /// Start the node: register with the cluster, spawn background
    /// tasks, and run auto-unseal when enabled.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if registration fails; auto-unseal
    /// failures are logged and leave the node sealed for manual unseal.
    pub async fn start(&self) -> Result<Vec<JoinHandle<()>>, BuildError> {
        self.coordinator.register().await?;
        let tasks = self.coordinator.spawn_background_tasks();

        if self.config.kms.auto_unseal_enabled
            && let Some(auto_unseal) = &self.auto_unseal
        {
            let lock_timeout = Duration::from_secs(self.config.locks.acquire_timeout_secs);
            match auto_unseal.run(&self.seal, lock_timeout).await {
                Ok(true) => info!("auto-unseal complete"),
                Ok(false) => info!("auto-unseal not applicable"),
                Err(error) => warn!(%error, "auto-unseal failed, manual unseal required"),
            }
        }

        // First election attempt happens eagerly; the leader watch task
        // keeps retrying afterwards.
        if self.coordinator.acquire_leadership().await? {
            info!("this node is the leader");
        }

        Ok(tasks)
    }

    /// State for the HTTP router.
    #[must_use]
    pub fn app_state(&self) -> AppState {
        AppState {
            seal: self.seal.clone(),
            coordinator: Arc::clone(&self.coordinator),
            version: self.version.clone(),
        }
    }

    /// Clean shutdown: cluster deregistration, then seal actor teardown
    /// (zeroizing key material).
    pub async fn shutdown(&self) {
        if let Err(error) = self.coordinator.shutdown().await {
            warn!(%error, "coordinator shutdown reported an error");
        }
        self.seal.shutdown().await;
        info!("node stopped");
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.coordinator.identity().node_id)
            .finish_non_exhaustive()
    }
}
