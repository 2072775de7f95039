//! Node identity and health sampling.

use chrono::{DateTime, Utc};
use secrethub_core::NodeId;
use std::sync::Mutex;
use sysinfo::System;
use uuid::Uuid;

/// This node's stable identity for the process lifetime.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    /// Stable node ID: `"{hostname}-{8 hex chars}"`.
    pub node_id: NodeId,
    /// Reported hostname.
    pub hostname: String,
    /// Software version advertised to the cluster.
    pub version: String,
    /// Process start time.
    pub started_at: DateTime<Utc>,
}

impl NodeIdentity {
    /// Generate an identity from the host name plus a random suffix.
    #[must_use]
    pub fn generate(version: impl Into<String>) -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        Self {
            node_id: NodeId::new(format!("{hostname}-{suffix}")),
            hostname,
            version: version.into(),
            started_at: Utc::now(),
        }
    }
}

/// Point-in-time host metrics captured on each heartbeat.
#[derive(Debug, Clone, Copy)]
pub struct HostMetrics {
    /// CPU utilization percent.
    pub cpu_percent: f32,
    /// Memory utilization percent.
    pub memory_percent: f32,
}

/// Host metrics sampler. Holds one [`System`] so successive CPU samples
/// have a meaningful baseline.
pub struct HostSampler {
    system: Mutex<System>,
}

impl HostSampler {
    /// Create a sampler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Take one sample.
    #[must_use]
    pub fn sample(&self) -> HostMetrics {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        system.refresh_cpu_usage();
        system.refresh_memory();

        let total = system.total_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            (system.used_memory() as f32 / total as f32) * 100.0
        };

        HostMetrics {
            cpu_percent: system.global_cpu_usage(),
            memory_percent,
        }
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSampler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_format() {
        let identity = NodeIdentity::generate("0.1.0");
        let id = identity.node_id.as_str();
        assert!(id.starts_with(&identity.hostname));
        // hostname + '-' + 8 hex chars
        assert_eq!(id.len(), identity.hostname.len() + 9);
    }

    #[test]
    fn test_identities_are_unique() {
        let a = NodeIdentity::generate("0.1.0");
        let b = NodeIdentity::generate("0.1.0");
        assert_ne!(a.node_id, b.node_id);
    }

    #[test]
    fn test_sampler_returns_bounded_percentages() {
        let sampler = HostSampler::new();
        let metrics = sampler.sample();
        assert!(metrics.memory_percent >= 0.0 && metrics.memory_percent <= 100.0);
        assert!(metrics.cpu_percent >= 0.0);
    }
}
