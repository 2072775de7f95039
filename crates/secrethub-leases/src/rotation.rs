//! The rotation capability and its runner.
//!
//! Engines implement [`Rotation`] and register by type string. The
//! scheduler (a collaborator that also owns cron parsing) drives the
//! [`RotationRunner`], whose role is exactly what the core owes it:
//! persist history rows and archive the pre-rotation secret version
//! through the secrets manager.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use secrethub_audit::{AuditActor, AuditChain, AuditEventDraft, AuditEventType};
use secrethub_core::{SecretId, SecretPath};
use secrethub_secrets::{SecretsManager, UpdateSecret};
use secrethub_storage::{RotationHistoryRecord, RotationHistoryStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{LeaseError, LeaseResult};

/// One rotation schedule, as handed over by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSchedule {
    /// Schedule identity.
    pub id: Uuid,
    /// The secret to rotate.
    pub secret_id: SecretId,
    /// Its path, for history rows.
    pub secret_path: SecretPath,
    /// Engine type string.
    pub engine_type: String,
    /// Engine-specific configuration.
    pub config: serde_json::Value,
}

/// Options for one rotation run.
#[derive(Debug, Clone, Default)]
pub struct RotationOptions {
    /// Who or what requested the run.
    pub requested_by: String,
}

/// What an engine produced: the replacement secret data plus free-form
/// metadata for the history row.
#[derive(Debug, Clone)]
pub struct RotatedCredentials {
    /// Replacement secret data.
    pub data: serde_json::Value,
    /// Engine-reported metadata.
    pub metadata: serde_json::Value,
}

/// Result of a successful rotation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationOutcome {
    /// Secret version before the run.
    pub old_version: u32,
    /// Secret version after the run.
    pub new_version: u32,
    /// Engine-reported metadata.
    pub metadata: serde_json::Value,
}

/// The capability set a rotation engine provides.
#[async_trait]
pub trait Rotation: Send + Sync {
    /// The type string this engine registers under.
    fn engine_type(&self) -> &str;

    /// Produce replacement credentials for the schedule's secret.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::Rotation`] describing the engine failure.
    async fn rotate(
        &self,
        schedule: &RotationSchedule,
        opts: &RotationOptions,
    ) -> LeaseResult<RotatedCredentials>;

    /// Undo a rotation at the engine (e.g. restore the prior remote
    /// credential), given the history row of the run being undone.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::Rotation`] describing the engine failure.
    async fn rollback(
        &self,
        schedule: &RotationSchedule,
        history: &RotationHistoryRecord,
    ) -> LeaseResult<()>;

    /// Check engine-specific configuration before a schedule is saved.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::Rotation`] describing the invalid config.
    async fn validate_config(&self, config: &serde_json::Value) -> LeaseResult<()>;
}

/// Engines registered by type string.
#[derive(Default)]
pub struct EngineRegistry {
    engines: DashMap<String, Arc<dyn Rotation>>,
}

impl EngineRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine under its type string, replacing any previous
    /// registration.
    pub fn register(&self, engine: Arc<dyn Rotation>) {
        self.engines
            .insert(engine.engine_type().to_string(), engine);
    }

    /// Resolve an engine.
    #[must_use]
    pub fn get(&self, engine_type: &str) -> Option<Arc<dyn Rotation>> {
        self.engines.get(engine_type).map(|e| Arc::clone(&e))
    }

    /// Registered type strings.
    #[must_use]
    pub fn engine_types(&self) -> Vec<String> {
        self.engines.iter().map(|e| e.key().clone()).collect()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.engine_types())
            .finish()
    }
}

/// Runs rotations: resolves the engine, records history, archives the
/// pre-rotation version via the secrets manager.
pub struct RotationRunner {
    registry: Arc<EngineRegistry>,
    history: Arc<dyn RotationHistoryStore>,
    secrets: Arc<SecretsManager>,
    audit: Arc<AuditChain>,
}

impl RotationRunner {
    /// Build a runner.
    #[must_use]
    pub fn new(
        registry: Arc<EngineRegistry>,
        history: Arc<dyn RotationHistoryStore>,
        secrets: Arc<SecretsManager>,
        audit: Arc<AuditChain>,
    ) -> Self {
        Self {
            registry,
            history,
            secrets,
            audit,
        }
    }

    /// Execute one rotation run.
    ///
    /// # Errors
    ///
    /// [`LeaseError::UnknownEngine`] for an unregistered type;
    /// [`LeaseError::Rotation`] when the engine fails (the failure is
    /// recorded in history); secrets or storage errors otherwise.
    pub async fn run(
        &self,
        schedule: &RotationSchedule,
        opts: &RotationOptions,
    ) -> LeaseResult<RotationOutcome> {
        let engine = self
            .registry
            .get(&schedule.engine_type)
            .ok_or_else(|| LeaseError::UnknownEngine(schedule.engine_type.clone()))?;

        let old_version = self
            .secrets
            .list_versions(schedule.secret_id)
            .await?
            .last()
            .map_or(0, |v| v.version);

        let started_at = Utc::now();
        let run_started = std::time::Instant::now();
        let mut row = RotationHistoryRecord {
            id: Uuid::new_v4(),
            schedule_id: schedule.id,
            secret_path: schedule.secret_path.clone(),
            started_at,
            finished_at: None,
            status: "running".to_string(),
            old_version: Some(old_version),
            new_version: None,
            duration_ms: None,
            error: None,
        };
        self.history.insert(row.clone()).await?;

        let actor = AuditActor::system(opts.requested_by.as_str());
        match engine.rotate(schedule, opts).await {
            Ok(credentials) => {
                let updated = self
                    .secrets
                    .update(
                        schedule.secret_id,
                        UpdateSecret {
                            data: Some(credentials.data),
                            ..UpdateSecret::default()
                        },
                        &opts.requested_by,
                        Some("rotation".to_string()),
                        &actor,
                    )
                    .await?;

                row.finished_at = Some(Utc::now());
                row.status = "succeeded".to_string();
                row.new_version = Some(updated.version);
                row.duration_ms = i64::try_from(run_started.elapsed().as_millis()).ok();
                self.history.update(row).await?;

                self.audit
                    .append(AuditEventDraft::new(
                        AuditEventType::RotationCompleted,
                        actor,
                    ))
                    .await?;

                info!(path = %schedule.secret_path, new_version = updated.version, "rotation succeeded");
                Ok(RotationOutcome {
                    old_version,
                    new_version: updated.version,
                    metadata: credentials.metadata,
                })
            },
            Err(engine_error) => {
                row.finished_at = Some(Utc::now());
                row.status = "failed".to_string();
                row.duration_ms = i64::try_from(run_started.elapsed().as_millis()).ok();
                row.error = Some(engine_error.to_string());
                self.history.update(row).await?;

                if let Err(audit_error) = self
                    .audit
                    .append(AuditEventDraft::new(AuditEventType::RotationFailed, actor))
                    .await
                {
                    warn!(%audit_error, "rotation failure could not be recorded");
                }

                warn!(path = %schedule.secret_path, error = %engine_error, "rotation failed");
                Err(engine_error)
            },
        }
    }

    /// Undo a rotation: engine-side rollback, then roll the secret back
    /// to the pre-rotation version.
    ///
    /// # Errors
    ///
    /// [`LeaseError::UnknownEngine`], engine failures, or secrets
    /// errors.
    pub async fn rollback(
        &self,
        schedule: &RotationSchedule,
        history: &RotationHistoryRecord,
    ) -> LeaseResult<()> {
        let engine = self
            .registry
            .get(&schedule.engine_type)
            .ok_or_else(|| LeaseError::UnknownEngine(schedule.engine_type.clone()))?;

        engine.rollback(schedule, history).await?;

        if let Some(old_version) = history.old_version.filter(|v| *v > 0) {
            let actor = AuditActor::system("rotation-scheduler");
            self.secrets
                .rollback(schedule.secret_id, old_version, "rotation-scheduler", &actor)
                .await?;
        }

        let mut row = history.clone();
        row.status = "rolled_back".to_string();
        row.finished_at = Some(Utc::now());
        self.history.update(row).await?;

        info!(path = %schedule.secret_path, "rotation rolled back");
        Ok(())
    }

    /// History rows for one schedule, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn history_for(&self, schedule_id: Uuid) -> LeaseResult<Vec<RotationHistoryRecord>> {
        Ok(self.history.for_schedule(schedule_id).await?)
    }
}

impl std::fmt::Debug for RotationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationRunner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrethub_audit::AuditChain;
    use secrethub_core::{EntityId, NodeId};
    use secrethub_policy::{PolicyEvaluator, PolicyService};
    use secrethub_seal::SealConfig;
    use secrethub_secrets::CreateSecret;
    use secrethub_storage::Storage;
    use std::time::Duration;

    struct FlipEngine {
        fail: bool,
    }

    #[async_trait]
    impl Rotation for FlipEngine {
        fn engine_type(&self) -> &str {
            "flip"
        }

        async fn rotate(
            &self,
            _schedule: &RotationSchedule,
            _opts: &RotationOptions,
        ) -> LeaseResult<RotatedCredentials> {
            if self.fail {
                return Err(LeaseError::Rotation("remote refused".to_string()));
            }
            Ok(RotatedCredentials {
                data: serde_json::json!({"password": "fresh"}),
                metadata: serde_json::json!({"rotated": true}),
            })
        }

        async fn rollback(
            &self,
            _schedule: &RotationSchedule,
            _history: &RotationHistoryRecord,
        ) -> LeaseResult<()> {
            Ok(())
        }

        async fn validate_config(&self, _config: &serde_json::Value) -> LeaseResult<()> {
            Ok(())
        }
    }

    struct Stack {
        runner: RotationRunner,
        secrets: Arc<SecretsManager>,
        schedule: RotationSchedule,
    }

    async fn stack(fail: bool) -> Stack {
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
        let secrets = Arc::new(SecretsManager::new(
            Arc::clone(&storage.secrets),
            seal,
            policies,
            Arc::clone(&audit),
        ));

        let path = SecretPath::parse("prod.db.postgres.password").unwrap();
        let meta = secrets
            .create(
                CreateSecret::new(path.clone(), serde_json::json!({"password": "stale"})),
                &AuditActor::admin("ops"),
            )
            .await
            .unwrap();

        let registry = Arc::new(EngineRegistry::new());
        registry.register(Arc::new(FlipEngine { fail }));

        let runner = RotationRunner::new(
            registry,
            Arc::clone(&storage.rotations),
            Arc::clone(&secrets),
            audit,
        );

        Stack {
            runner,
            secrets,
            schedule: RotationSchedule {
                id: Uuid::new_v4(),
                secret_id: meta.id,
                secret_path: path,
                engine_type: "flip".to_string(),
                config: serde_json::json!({}),
            },
        }
    }

    fn opts() -> RotationOptions {
        RotationOptions {
            requested_by: "scheduler".to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_rotation_archives_and_records() {
        let stack = stack(false).await;

        let outcome = stack.runner.run(&stack.schedule, &opts()).await.unwrap();
        assert_eq!(outcome.old_version, 1);
        assert_eq!(outcome.new_version, 2);

        let (_, data) = stack
            .secrets
            .read_decrypted(&stack.schedule.secret_path)
            .await
            .unwrap();
        assert_eq!(data, serde_json::json!({"password": "fresh"}));

        let history = stack.runner.history_for(stack.schedule.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, "succeeded");
        assert_eq!(history[0].new_version, Some(2));
        assert!(history[0].duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_failed_rotation_keeps_secret_and_records_failure() {
        let stack = stack(true).await;

        assert!(matches!(
            stack.runner.run(&stack.schedule, &opts()).await,
            Err(LeaseError::Rotation(_))
        ));

        let (_, data) = stack
            .secrets
            .read_decrypted(&stack.schedule.secret_path)
            .await
            .unwrap();
        assert_eq!(data, serde_json::json!({"password": "stale"}));

        let history = stack.runner.history_for(stack.schedule.id).await.unwrap();
        assert_eq!(history[0].status, "failed");
        assert_eq!(history[0].error.as_deref(), Some("rotation failed: remote refused"));
    }

    #[tokio::test]
    async fn test_unknown_engine() {
        let stack = stack(false).await;
        let mut schedule = stack.schedule.clone();
        schedule.engine_type = "missing".to_string();

        assert!(matches!(
            stack.runner.run(&schedule, &opts()).await,
            Err(LeaseError::UnknownEngine(_))
        ));
    }

    #[tokio::test]
    async fn test_rollback_restores_previous_version() {
        let stack = stack(false).await;
        stack.runner.run(&stack.schedule, &opts()).await.unwrap();

        let history = stack.runner.history_for(stack.schedule.id).await.unwrap();
        stack
            .runner
            .rollback(&stack.schedule, &history[0])
            .await
            .unwrap();

        let (meta, data) = stack
            .secrets
            .read_decrypted(&stack.schedule.secret_path)
            .await
            .unwrap();
        assert_eq!(data, serde_json::json!({"password": "stale"}));
        // Rollback is additive: a new forward version.
        assert_eq!(meta.version, 3);

        let history = stack.runner.history_for(stack.schedule.id).await.unwrap();
        assert_eq!(history[0].status, "rolled_back");
    }
}
