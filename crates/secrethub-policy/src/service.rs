//! Policy service: validated CRUD over the policy store.
//!
//! Documents are validated here, before they reach storage; the evaluator
//! can therefore trust every stored policy. Mutations invalidate the
//! memoization cache and are recorded in the audit chain — an audit write
//! failure aborts the mutation result.

use chrono::Utc;
use secrethub_audit::{AuditActor, AuditChain, AuditEventDraft, AuditEventType};
use secrethub_core::{EntityId, PolicyId};
use secrethub_storage::{PolicyRecord, PolicyStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::document::{Policy, PolicyDocument};
use crate::error::{PolicyError, PolicyResult};
use crate::evaluator::{AccessDecision, EvaluationContext, PolicyEvaluator};

/// Attributes for creating or replacing a policy.
#[derive(Debug, Clone)]
pub struct PolicyAttrs {
    /// Unique name.
    pub name: String,
    /// Human description.
    pub description: Option<String>,
    /// Explicit-deny flag.
    pub deny: bool,
    /// The document.
    pub document: PolicyDocument,
    /// Entities the policy applies to; empty means all.
    pub entity_bindings: Vec<EntityId>,
    /// Cap on requested TTLs.
    pub max_ttl: Option<Duration>,
}

/// Validated CRUD and access decisions over stored policies.
pub struct PolicyService {
    store: Arc<dyn PolicyStore>,
    evaluator: Arc<PolicyEvaluator>,
    audit: Arc<AuditChain>,
}

impl PolicyService {
    /// Build a service.
    #[must_use]
    pub fn new(
        store: Arc<dyn PolicyStore>,
        evaluator: Arc<PolicyEvaluator>,
        audit: Arc<AuditChain>,
    ) -> Self {
        Self {
            store,
            evaluator,
            audit,
        }
    }

    /// The shared evaluator.
    #[must_use]
    pub fn evaluator(&self) -> &Arc<PolicyEvaluator> {
        &self.evaluator
    }

    /// Create a policy after validating its document.
    ///
    /// # Errors
    ///
    /// Returns a validation error, a storage conflict on a duplicate
    /// name, or an audit write failure.
    pub async fn create(&self, attrs: PolicyAttrs, actor: &AuditActor) -> PolicyResult<Policy> {
        attrs.document.validate()?;

        let now = Utc::now();
        let record = PolicyRecord {
            id: PolicyId::new(),
            name: attrs.name,
            description: attrs.description,
            deny: attrs.deny,
            document: serde_json::to_value(&attrs.document)
                .map_err(|e| PolicyError::InvalidDocument(e.to_string()))?,
            entity_bindings: attrs.entity_bindings,
            max_ttl_secs: attrs.max_ttl.and_then(|ttl| i64::try_from(ttl.as_secs()).ok()),
            created_at: now,
            updated_at: now,
        };
        self.store.insert(record.clone()).await?;
        self.evaluator.invalidate();

        self.audit
            .append(AuditEventDraft::new(
                AuditEventType::PolicyCreated,
                actor.clone(),
            ))
            .await?;

        info!(policy = %record.name, "policy created");
        Policy::from_record(&record)
    }

    /// Replace a policy after validating the new document.
    ///
    /// # Errors
    ///
    /// Returns a validation error, [`PolicyError::NotFound`], or an audit
    /// write failure.
    pub async fn update(
        &self,
        id: PolicyId,
        attrs: PolicyAttrs,
        actor: &AuditActor,
    ) -> PolicyResult<Policy> {
        attrs.document.validate()?;

        let existing = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| PolicyError::NotFound(id.to_string()))?;

        let record = PolicyRecord {
            id,
            name: attrs.name,
            description: attrs.description,
            deny: attrs.deny,
            document: serde_json::to_value(&attrs.document)
                .map_err(|e| PolicyError::InvalidDocument(e.to_string()))?,
            entity_bindings: attrs.entity_bindings,
            max_ttl_secs: attrs.max_ttl.and_then(|ttl| i64::try_from(ttl.as_secs()).ok()),
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };
        self.store.update(record.clone()).await?;
        self.evaluator.invalidate();

        self.audit
            .append(AuditEventDraft::new(
                AuditEventType::PolicyUpdated,
                actor.clone(),
            ))
            .await?;

        info!(policy = %record.name, "policy updated");
        Policy::from_record(&record)
    }

    /// Delete a policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::NotFound`] or an audit write failure.
    pub async fn delete(&self, id: PolicyId, actor: &AuditActor) -> PolicyResult<()> {
        self.store.delete(id).await?;
        self.evaluator.invalidate();

        self.audit
            .append(AuditEventDraft::new(
                AuditEventType::PolicyDeleted,
                actor.clone(),
            ))
            .await?;

        info!(policy_id = %id, "policy deleted");
        Ok(())
    }

    /// Fetch one policy by name.
    ///
    /// # Errors
    ///
    /// Returns a storage error or a decode error for a corrupted record.
    pub async fn get_by_name(&self, name: &str) -> PolicyResult<Option<Policy>> {
        self.store
            .get_by_name(name)
            .await?
            .as_ref()
            .map(Policy::from_record)
            .transpose()
    }

    /// List every policy.
    ///
    /// # Errors
    ///
    /// Returns a storage error or a decode error for a corrupted record.
    pub async fn list(&self) -> PolicyResult<Vec<Policy>> {
        self.store
            .list()
            .await?
            .iter()
            .map(Policy::from_record)
            .collect()
    }

    /// The policies applying to `entity` (bound plus unbound).
    ///
    /// # Errors
    ///
    /// Returns a storage error or a decode error for a corrupted record.
    pub async fn policies_for_entity(&self, entity: &EntityId) -> PolicyResult<Vec<Policy>> {
        self.store
            .for_entity(entity)
            .await?
            .iter()
            .map(Policy::from_record)
            .collect()
    }

    /// Decide access for `ctx` across the entity's policy set.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the policy set cannot be loaded.
    pub async fn decide(&self, ctx: &EvaluationContext) -> PolicyResult<AccessDecision> {
        let policies = self.policies_for_entity(&ctx.entity_id).await?;
        Ok(self.evaluator.evaluate_access(&policies, ctx))
    }
}

impl std::fmt::Debug for PolicyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyService").finish_non_exhaustive()
    }
}
