//! Audit event vocabulary and drafts.
//!
//! A draft carries the fact-bearing fields of an event; the chain writer
//! assigns sequence number, hashes, and signature when it appends.

use secrethub_core::{ActorType, CorrelationId, SecretId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every security-relevant event type the core records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Cluster initialized; shares were returned to the operator.
    VaultInitialized,
    /// Threshold reached and the master key reconstructed.
    VaultUnsealed,
    /// Operator-requested seal.
    VaultSealed,
    /// Inactivity timer sealed the node.
    AutoSealed,
    /// A secret was created.
    SecretCreated,
    /// A policy-gated read was granted.
    SecretAccessed,
    /// A policy-gated read was denied.
    SecretAccessDenied,
    /// A secret was updated (prior version archived).
    SecretUpdated,
    /// A secret was rolled back to an earlier version.
    SecretRolledBack,
    /// A secret was deleted.
    SecretDeleted,
    /// A policy was created.
    PolicyCreated,
    /// A policy was updated.
    PolicyUpdated,
    /// A policy was deleted.
    PolicyDeleted,
    /// This node won the leader lock.
    LeaderElected,
    /// This node observed loss of the leader lock and demoted itself.
    LeaderLost,
    /// A node registered with the cluster.
    NodeRegistered,
    /// A node shut down cleanly.
    NodeShutdown,
    /// A dynamic-credential lease was issued.
    LeaseIssued,
    /// A lease was revoked.
    LeaseRevoked,
    /// A rotation run finished successfully.
    RotationCompleted,
    /// A rotation run failed.
    RotationFailed,
}

impl AuditEventType {
    /// Canonical dotted name, e.g. `secret.access_denied`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VaultInitialized => "vault.initialized",
            Self::VaultUnsealed => "vault.unsealed",
            Self::VaultSealed => "vault.sealed",
            Self::AutoSealed => "vault.auto_sealed",
            Self::SecretCreated => "secret.created",
            Self::SecretAccessed => "secret.accessed",
            Self::SecretAccessDenied => "secret.access_denied",
            Self::SecretUpdated => "secret.updated",
            Self::SecretRolledBack => "secret.rolled_back",
            Self::SecretDeleted => "secret.deleted",
            Self::PolicyCreated => "policy.created",
            Self::PolicyUpdated => "policy.updated",
            Self::PolicyDeleted => "policy.deleted",
            Self::LeaderElected => "cluster.leader_elected",
            Self::LeaderLost => "cluster.leader_lost",
            Self::NodeRegistered => "cluster.node_registered",
            Self::NodeShutdown => "cluster.node_shutdown",
            Self::LeaseIssued => "lease.issued",
            Self::LeaseRevoked => "lease.revoked",
            Self::RotationCompleted => "rotation.completed",
            Self::RotationFailed => "rotation.failed",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who performed an audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    /// Kind of actor.
    pub actor_type: ActorType,
    /// Actor identity string.
    pub actor_id: String,
}

impl AuditActor {
    /// The control plane itself (timers, coordinators), identified by
    /// node ID.
    #[must_use]
    pub fn system(node_id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::System,
            actor_id: node_id.into(),
        }
    }

    /// A host agent.
    #[must_use]
    pub fn agent(id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Agent,
            actor_id: id.into(),
        }
    }

    /// An application identity.
    #[must_use]
    pub fn application(id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Application,
            actor_id: id.into(),
        }
    }

    /// A human operator.
    #[must_use]
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Admin,
            actor_id: id.into(),
        }
    }
}

/// The fact-bearing fields of an event, before the chain writer assigns
/// sequence, hashes, and signature.
#[derive(Debug, Clone)]
pub struct AuditEventDraft {
    /// What happened.
    pub event_type: AuditEventType,
    /// Who did it.
    pub actor: AuditActor,
    /// Affected secret.
    pub secret_id: Option<SecretId>,
    /// Affected secret version.
    pub secret_version: Option<u32>,
    /// Whether access was granted, for access events.
    pub access_granted: Option<bool>,
    /// Name of the deciding policy.
    pub policy_name: Option<String>,
    /// Why access was denied.
    pub denial_reason: Option<String>,
    /// Source IP of the request.
    pub source_ip: Option<String>,
    /// Correlation ID threading the request.
    pub correlation_id: Option<CorrelationId>,
}

impl AuditEventDraft {
    /// Start a draft.
    #[must_use]
    pub fn new(event_type: AuditEventType, actor: AuditActor) -> Self {
        Self {
            event_type,
            actor,
            secret_id: None,
            secret_version: None,
            access_granted: None,
            policy_name: None,
            denial_reason: None,
            source_ip: None,
            correlation_id: None,
        }
    }

    /// Attach the affected secret.
    #[must_use]
    pub fn secret(mut self, id: SecretId, version: Option<u32>) -> Self {
        self.secret_id = Some(id);
        self.secret_version = version;
        self
    }

    /// Mark access granted under `policy`.
    #[must_use]
    pub fn granted(mut self, policy: impl Into<String>) -> Self {
        self.access_granted = Some(true);
        self.policy_name = Some(policy.into());
        self
    }

    /// Mark access denied for `reason`.
    #[must_use]
    pub fn denied(mut self, reason: impl Into<String>) -> Self {
        self.access_granted = Some(false);
        self.denial_reason = Some(reason.into());
        self
    }

    /// Attach the request source IP.
    #[must_use]
    pub fn source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self
    }

    /// Attach a correlation ID.
    #[must_use]
    pub fn correlation(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names_are_dotted() {
        assert_eq!(AuditEventType::SecretAccessed.as_str(), "secret.accessed");
        assert_eq!(
            AuditEventType::SecretAccessDenied.as_str(),
            "secret.access_denied"
        );
        assert_eq!(AuditEventType::AutoSealed.as_str(), "vault.auto_sealed");
    }

    #[test]
    fn test_draft_builder() {
        let draft = AuditEventDraft::new(
            AuditEventType::SecretAccessDenied,
            AuditActor::application("billing"),
        )
        .denied("outside allowed hours")
        .source_ip("10.1.2.3");

        assert_eq!(draft.access_granted, Some(false));
        assert_eq!(draft.denial_reason.as_deref(), Some("outside allowed hours"));
        assert_eq!(draft.source_ip.as_deref(), Some("10.1.2.3"));
        assert!(draft.policy_name.is_none());
    }
}
