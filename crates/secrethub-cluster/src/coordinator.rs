//! The cluster coordinator.
//!
//! Owns this node's registration and heartbeats, cluster-wide
//! initialization ordering, and leader election. Initialization happens
//! exactly once per cluster lifetime (serialized by the `init` lock);
//! leader election guarantees mutual exclusion through a session-mode
//! lock but not liveness across arbitrary partitions — a minority
//! partition sees no leader.

use chrono::Utc;
use secrethub_audit::{AuditActor, AuditChain, AuditEventDraft, AuditEventType};
use secrethub_core::NodeStatus;
use secrethub_crypto::UnsealShare;
use secrethub_seal::{SealError, SealHandle};
use secrethub_storage::{
    HealthSample, HealthStore, LockGuard, LockManager, LockMode, LockName, NodeRecord, NodeStore,
    StorageError, VaultConfigStore, acquire, with_lock,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClusterError, ClusterResult};
use crate::node::{HostSampler, NodeIdentity};

/// Coordinator tunables.
#[derive(Debug, Clone, Copy)]
pub struct ClusterConfig {
    /// Interval between heartbeats.
    pub heartbeat_interval: Duration,
    /// Age after which a non-shutdown node record is swept.
    pub node_timeout: Duration,
    /// Interval between leader-lock validity checks and re-election
    /// attempts.
    pub leader_check_interval: Duration,
    /// Timeout for one leader-lock acquisition attempt.
    pub leader_lock_timeout: Duration,
    /// Timeout for the `init` lock.
    pub init_lock_timeout: Duration,
    /// Health history retention.
    pub health_retention: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            node_timeout: Duration::from_secs(30),
            leader_check_interval: Duration::from_secs(15),
            leader_lock_timeout: Duration::from_secs(1),
            init_lock_timeout: Duration::from_secs(5),
            health_retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl ClusterConfig {
    /// Derive from the runtime configuration.
    #[must_use]
    pub fn from_core(config: &secrethub_core::CoreConfig) -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(config.cluster.heartbeat_secs),
            node_timeout: Duration::from_secs(config.cluster.node_timeout_secs),
            leader_check_interval: Duration::from_secs(config.cluster.leader_check_secs),
            leader_lock_timeout: Duration::from_secs(config.locks.leader_timeout_secs),
            init_lock_timeout: Duration::from_secs(config.locks.init_timeout_secs),
            health_retention: Duration::from_secs(
                u64::try_from(config.retention.health_keep_days.max(0)).unwrap_or(7) * 24 * 3600,
            ),
        }
    }
}

/// Outcome of [`ClusterCoordinator::coordinated_init`].
#[derive(Debug)]
pub enum InitOutcome {
    /// This node initialized the cluster; the shares are returned to the
    /// caller exactly once.
    Initialized(Vec<UnsealShare>),
    /// Another node got there first; proceed to unseal.
    AlreadyInitialized,
}

/// Node registration, heartbeats, coordinated init, leader election.
pub struct ClusterCoordinator {
    identity: NodeIdentity,
    nodes: Arc<dyn NodeStore>,
    health: Arc<dyn HealthStore>,
    vault: Arc<dyn VaultConfigStore>,
    locks: Arc<dyn LockManager>,
    seal: SealHandle,
    audit: Arc<AuditChain>,
    config: ClusterConfig,
    sampler: HostSampler,
    leader: tokio::sync::Mutex<Option<LockGuard>>,
    is_leader: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl ClusterCoordinator {
    /// Build a coordinator.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: NodeIdentity,
        nodes: Arc<dyn NodeStore>,
        health: Arc<dyn HealthStore>,
        vault: Arc<dyn VaultConfigStore>,
        locks: Arc<dyn LockManager>,
        seal: SealHandle,
        audit: Arc<AuditChain>,
        config: ClusterConfig,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            identity,
            nodes,
            health,
            vault,
            locks,
            seal,
            audit,
            config,
            sampler: HostSampler::new(),
            leader: tokio::sync::Mutex::new(None),
            is_leader: AtomicBool::new(false),
            shutdown_tx,
        })
    }

    /// This node's identity.
    #[must_use]
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Whether this node currently believes it is leader.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Register this node with `status = starting`.
    ///
    /// # Errors
    ///
    /// Returns a storage error or an audit write failure.
    pub async fn register(&self) -> ClusterResult<()> {
        let now = Utc::now();
        self.nodes
            .upsert(NodeRecord {
                node_id: self.identity.node_id.clone(),
                hostname: self.identity.hostname.clone(),
                status: NodeStatus::Starting,
                is_leader: false,
                started_at: self.identity.started_at,
                last_seen_at: now,
                version: self.identity.version.clone(),
                metadata: serde_json::json!({}),
            })
            .await?;

        self.audit
            .append(AuditEventDraft::new(
                AuditEventType::NodeRegistered,
                AuditActor::system(self.identity.node_id.as_str()),
            ))
            .await?;

        info!(node = %self.identity.node_id, "node registered");
        Ok(())
    }

    /// One heartbeat: refresh `last_seen_at` and status, append a health
    /// sample, prune old samples.
    ///
    /// # Errors
    ///
    /// Returns a storage error; heartbeat errors do not tear down the
    /// node (the background task logs and continues).
    pub async fn heartbeat_once(&self) -> ClusterResult<()> {
        let status = match self.seal.status().await {
            Ok(status) if status.sealed => NodeStatus::Sealed,
            Ok(_) => NodeStatus::Unsealed,
            Err(SealError::Unavailable) => NodeStatus::Shutdown,
            Err(error) => return Err(error.into()),
        };
        let now = Utc::now();

        // The store round-trip doubles as the DB latency probe.
        let probe_started = std::time::Instant::now();
        let existing = self.nodes.get(&self.identity.node_id).await?;
        let db_latency_ms = probe_started.elapsed().as_secs_f64() * 1000.0;

        if existing.is_some() {
            self.nodes
                .touch(&self.identity.node_id, now, status, self.is_leader())
                .await?;
        } else {
            // Swept while we were away; re-register.
            self.nodes
                .upsert(NodeRecord {
                    node_id: self.identity.node_id.clone(),
                    hostname: self.identity.hostname.clone(),
                    status,
                    is_leader: self.is_leader(),
                    started_at: self.identity.started_at,
                    last_seen_at: now,
                    version: self.identity.version.clone(),
                    metadata: serde_json::json!({}),
                })
                .await?;
        }

        let metrics = self.sampler.sample();
        self.health
            .insert(HealthSample {
                node_id: self.identity.node_id.clone(),
                sampled_at: now,
                cpu_percent: metrics.cpu_percent,
                memory_percent: metrics.memory_percent,
                db_latency_ms,
                sealed: status == NodeStatus::Sealed,
            })
            .await?;

        let retention = chrono::Duration::from_std(self.config.health_retention)
            .unwrap_or_else(|_| chrono::Duration::days(7));
        self.health.prune_before(now - retention).await?;

        Ok(())
    }

    /// Delete node records not seen within the node timeout (shutdown
    /// records are spared).
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn sweep_once(&self) -> ClusterResult<u64> {
        let timeout = chrono::Duration::from_std(self.config.node_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let swept = self.nodes.sweep_stale(Utc::now() - timeout).await?;
        if swept > 0 {
            debug!(swept, "stale node records removed");
        }
        Ok(swept)
    }

    /// Initialize the cluster exactly once. Races on the `init` lock;
    /// losers observe the winner's vault config and proceed to unseal.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::InitLockTimeout`] when the lock stayed
    /// busy; seal or storage errors otherwise.
    pub async fn coordinated_init(&self, threshold: u8, total: u8) -> ClusterResult<InitOutcome> {
        let vault = Arc::clone(&self.vault);
        let seal = self.seal.clone();

        let outcome = with_lock(
            Arc::clone(&self.locks),
            LockName::Init,
            self.config.init_lock_timeout,
            || async move {
                if vault.load().await?.is_some() {
                    return Ok(InitOutcome::AlreadyInitialized);
                }
                match seal.initialize(threshold, total).await {
                    Ok(shares) => Ok(InitOutcome::Initialized(shares)),
                    Err(SealError::AlreadyInitialized) => Ok(InitOutcome::AlreadyInitialized),
                    Err(error) => Err(ClusterError::from(error)),
                }
            },
        )
        .await;

        match outcome {
            Ok(inner) => inner,
            Err(StorageError::LockTimeout(_)) => Err(ClusterError::InitLockTimeout),
            Err(error) => Err(error.into()),
        }
    }

    /// One leadership acquisition attempt. Returns whether this node is
    /// leader afterwards; a busy lock is not an error.
    ///
    /// # Errors
    ///
    /// Returns storage errors other than lock timeout, or an audit write
    /// failure (in which case the lock is released again).
    pub async fn acquire_leadership(&self) -> ClusterResult<bool> {
        let mut slot = self.leader.lock().await;
        if slot.is_some() {
            return Ok(self.is_leader());
        }

        let guard = match acquire(
            Arc::clone(&self.locks),
            LockName::Leader,
            LockMode::Session,
            self.config.leader_lock_timeout,
        )
        .await
        {
            Ok(guard) => guard,
            Err(StorageError::LockTimeout(_)) => return Ok(false),
            Err(error) => return Err(error.into()),
        };

        if let Err(audit_error) = self
            .audit
            .append(AuditEventDraft::new(
                AuditEventType::LeaderElected,
                AuditActor::system(self.identity.node_id.as_str()),
            ))
            .await
        {
            // An unrecorded election does not happen.
            let _ = guard.release().await;
            return Err(audit_error.into());
        }

        *slot = Some(guard);
        self.is_leader.store(true, Ordering::SeqCst);
        info!(node = %self.identity.node_id, "leadership acquired");
        Ok(true)
    }

    /// Verify the leader lock is still held; demote on loss. Returns the
    /// post-check leadership state.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the verification probe fails.
    pub async fn check_leadership(&self) -> ClusterResult<bool> {
        let mut slot = self.leader.lock().await;
        let Some(guard) = slot.as_ref() else {
            self.is_leader.store(false, Ordering::SeqCst);
            return Ok(false);
        };

        if guard.verify().await? {
            return Ok(true);
        }

        // The lock is gone (session severed, partition): demote.
        drop(slot.take());
        self.is_leader.store(false, Ordering::SeqCst);
        warn!(node = %self.identity.node_id, "leader lock lost, demoting");

        if let Err(audit_error) = self
            .audit
            .append(AuditEventDraft::new(
                AuditEventType::LeaderLost,
                AuditActor::system(self.identity.node_id.as_str()),
            ))
            .await
        {
            warn!(%audit_error, "leadership loss could not be recorded");
        }
        Ok(false)
    }

    /// Voluntarily give up leadership.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the lock release.
    pub async fn release_leadership(&self) -> ClusterResult<()> {
        let mut slot = self.leader.lock().await;
        if let Some(guard) = slot.take() {
            self.is_leader.store(false, Ordering::SeqCst);
            guard.release().await?;
            info!(node = %self.identity.node_id, "leadership released");
        }
        Ok(())
    }

    /// All registered nodes, for `/cluster/info`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn cluster_info(&self) -> ClusterResult<Vec<NodeRecord>> {
        Ok(self.nodes.list().await?)
    }

    /// Spawn the background tasks: heartbeat, stale-node sweep, and the
    /// leader watch (validity check while leading, re-election attempts
    /// while not). Tasks stop when [`ClusterCoordinator::shutdown`] runs.
    #[must_use]
    pub fn spawn_background_tasks(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::with_capacity(3);

        let coordinator = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.config.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = coordinator.heartbeat_once().await {
                            warn!(%error, "heartbeat failed");
                        }
                    },
                    _ = shutdown.changed() => break,
                }
            }
        }));

        let coordinator = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.config.node_timeout);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = coordinator.sweep_once().await {
                            warn!(%error, "stale node sweep failed");
                        }
                    },
                    _ = shutdown.changed() => break,
                }
            }
        }));

        let coordinator = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.config.leader_check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let result = if coordinator.is_leader() {
                            coordinator.check_leadership().await
                        } else {
                            coordinator.acquire_leadership().await
                        };
                        if let Err(error) = result {
                            warn!(%error, "leader watch iteration failed");
                        }
                    },
                    _ = shutdown.changed() => break,
                }
            }
        }));

        tasks
    }

    /// Clean shutdown: stop background tasks, release leadership, mark
    /// the node record `shutdown` (sparing it from the sweep), and
    /// record the event.
    ///
    /// # Errors
    ///
    /// Returns the first storage or audit failure; shutdown proceeds as
    /// far as it can regardless.
    pub async fn shutdown(&self) -> ClusterResult<()> {
        let _ = self.shutdown_tx.send(true);
        self.release_leadership().await?;

        self.nodes
            .touch(&self.identity.node_id, Utc::now(), NodeStatus::Shutdown, false)
            .await?;

        self.audit
            .append(AuditEventDraft::new(
                AuditEventType::NodeShutdown,
                AuditActor::system(self.identity.node_id.as_str()),
            ))
            .await?;

        info!(node = %self.identity.node_id, "node shut down");
        Ok(())
    }
}

impl std::fmt::Debug for ClusterCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCoordinator")
            .field("node_id", &self.identity.node_id)
            .field("is_leader", &self.is_leader())
            .finish_non_exhaustive()
    }
}
