//! Runtime configuration.
//!
//! Every tunable the control plane consumes — seal timing, cluster
//! intervals, lock timeouts, cache TTLs, retention windows — lives in one
//! explicit [`CoreConfig`] struct built at startup and passed down. There
//! are no ambient globals. Each section implements [`Default`] with
//! production values, so a partially specified config still works.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for a SecretHub node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Durable store connection.
    pub database: DatabaseSection,
    /// Seal state machine timing.
    pub seal: SealSection,
    /// Node registry, heartbeat, and election intervals.
    pub cluster: ClusterSection,
    /// Distributed lock timeouts.
    pub locks: LocksSection,
    /// Policy evaluator cache.
    pub policy: PolicySection,
    /// Version and health retention windows.
    pub retention: RetentionSection,
    /// Audit chain keying and modes.
    pub audit: AuditSection,
    /// Auto-unseal / KMS settings.
    pub kms: KmsSection,
    /// HTTP surface binding.
    pub server: ServerSection,
}

impl CoreConfig {
    /// Build a config from defaults plus the environment variables the
    /// core consumes: `DATABASE_URL`, `AUDIT_HMAC_KEY`, `ENCRYPTION_KEY`,
    /// `AUTO_UNSEAL_ENABLED`, `KMS_PROVIDER`, `KMS_KEY_ID`, `KMS_REGION`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = Some(url);
        }
        if let Ok(key) = std::env::var("AUDIT_HMAC_KEY") {
            config.audit.hmac_key = Some(key);
        }
        if let Ok(key) = std::env::var("ENCRYPTION_KEY") {
            config.kms.encryption_key = Some(key);
        }
        if let Ok(enabled) = std::env::var("AUTO_UNSEAL_ENABLED") {
            config.kms.auto_unseal_enabled = matches!(enabled.as_str(), "true" | "1" | "yes");
        }
        if let Ok(provider) = std::env::var("KMS_PROVIDER") {
            config.kms.provider = provider;
        }
        if let Ok(key_id) = std::env::var("KMS_KEY_ID") {
            config.kms.key_id = Some(key_id);
        }
        if let Ok(region) = std::env::var("KMS_REGION") {
            config.kms.region = Some(region);
        }
        config
    }
}

/// Durable store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Postgres connection URL. `None` selects the in-memory backend
    /// (single-node development and tests).
    pub url: Option<String>,
    /// Per-query timeout.
    pub query_timeout_secs: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: None,
            query_timeout_secs: 15,
        }
    }
}

/// Seal state machine timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SealSection {
    /// Inactivity interval after which an unsealed node re-seals itself.
    pub auto_seal_secs: u64,
}

impl SealSection {
    /// The auto-seal interval as a [`Duration`].
    #[must_use]
    pub const fn auto_seal_after(&self) -> Duration {
        Duration::from_secs(self.auto_seal_secs)
    }
}

impl Default for SealSection {
    fn default() -> Self {
        Self { auto_seal_secs: 30 }
    }
}

/// Cluster coordination intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Seconds between heartbeats.
    pub heartbeat_secs: u64,
    /// Age after which a non-shutdown node record is swept.
    pub node_timeout_secs: u64,
    /// Seconds between leader-lock validity checks.
    pub leader_check_secs: u64,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            heartbeat_secs: 10,
            node_timeout_secs: 30,
            leader_check_secs: 15,
        }
    }
}

/// Distributed lock acquire timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocksSection {
    /// Default acquire timeout.
    pub acquire_timeout_secs: u64,
    /// Timeout for the `init` lock during coordinated initialization.
    pub init_timeout_secs: u64,
    /// Timeout for the `leader` lock during election attempts.
    pub leader_timeout_secs: u64,
}

impl Default for LocksSection {
    fn default() -> Self {
        Self {
            acquire_timeout_secs: 30,
            init_timeout_secs: 5,
            leader_timeout_secs: 1,
        }
    }
}

/// Policy evaluator cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Memoized verdict lifetime in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
        }
    }
}

/// Retention windows for archived data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSection {
    /// Secret versions kept regardless of age.
    pub versions_keep_last: u32,
    /// Secret versions kept if newer than this many days.
    pub versions_keep_days: i64,
    /// Days of node health history kept.
    pub health_keep_days: i64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            versions_keep_last: 10,
            versions_keep_days: 30,
            health_keep_days: 7,
        }
    }
}

/// Audit chain configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// HMAC key for event signatures. Required unless `dev_mode` is set.
    #[serde(skip_serializing)]
    pub hmac_key: Option<String>,
    /// Accept a missing HMAC key and substitute a fixed development key.
    /// Never set in production.
    pub dev_mode: bool,
    /// Allow audit appends to no-op before the store is reachable.
    /// Only honored in test builds of collaborating services.
    pub allow_disabled: bool,
}

/// Auto-unseal / KMS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KmsSection {
    /// Whether auto-unseal runs at startup.
    pub auto_unseal_enabled: bool,
    /// KMS provider tag (`static`, `aws`, `gcp`, ...). Only `static`
    /// ships in-tree; cloud connectors are collaborators.
    pub provider: String,
    /// Provider-side key identifier.
    pub key_id: Option<String>,
    /// Provider region.
    pub region: Option<String>,
    /// Key material for the `static` provider, fed through HKDF.
    #[serde(skip_serializing)]
    pub encryption_key: Option<String>,
    /// Attempts before auto-unseal gives up.
    pub max_retries: u32,
    /// Delay between auto-unseal attempts.
    pub retry_delay_secs: u64,
}

impl Default for KmsSection {
    fn default() -> Self {
        Self {
            auto_unseal_enabled: false,
            provider: "static".to_string(),
            key_id: None,
            region: None,
            encryption_key: None,
            max_retries: 3,
            retry_delay_secs: 5,
        }
    }
}

/// HTTP surface binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Listen address for the REST surface.
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8200".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.seal.auto_seal_secs, 30);
        assert_eq!(config.cluster.heartbeat_secs, 10);
        assert_eq!(config.cluster.node_timeout_secs, 30);
        assert_eq!(config.cluster.leader_check_secs, 15);
        assert_eq!(config.locks.acquire_timeout_secs, 30);
        assert_eq!(config.locks.init_timeout_secs, 5);
        assert_eq!(config.locks.leader_timeout_secs, 1);
        assert_eq!(config.policy.cache_ttl_secs, 300);
        assert_eq!(config.retention.health_keep_days, 7);
        assert_eq!(config.database.query_timeout_secs, 15);
    }

    #[test]
    fn test_partial_deserialization() {
        let config: CoreConfig =
            serde_json::from_str(r#"{"seal": {"auto_seal_secs": 60}}"#).unwrap();
        assert_eq!(config.seal.auto_seal_secs, 60);
        assert_eq!(config.cluster.heartbeat_secs, 10);
    }

    #[test]
    fn test_auto_seal_duration() {
        let section = SealSection { auto_seal_secs: 30 };
        assert_eq!(section.auto_seal_after(), Duration::from_secs(30));
    }
}
