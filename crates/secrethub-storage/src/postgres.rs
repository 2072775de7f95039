//! Postgres backend.
//!
//! Implements every repository trait over sqlx with the constraints the
//! core relies on expressed as real database constraints: unique indexes
//! on secret path, policy name, audit sequence, and node ID; multi-row
//! operations inside transactions; advisory locks via the
//! `pg_advisory_lock` family.
//!
//! Schema management is deliberately simple: [`PgBackend::migrate`] runs
//! idempotent `CREATE TABLE IF NOT EXISTS` statements at startup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrethub_core::{
    ActorType, CorrelationId, EntityId, EventId, LeaseId, NodeId, NodeStatus, PolicyId, SecretId,
    SecretPath, SecretType,
};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, pool::PoolConnection};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::lock::{LockHandle, LockInfo, LockManager, LockMode, LockName, ReleaseOutcome};
use crate::records::{
    AuditEventRecord, AuditQuery, AutoUnsealRecord, HealthSample, LeaseRecord, NodeRecord,
    PolicyRecord, RotationHistoryRecord, SecretFilter, SecretRecord, SecretVersionRecord,
    VaultConfigRecord,
};
use crate::store::{
    AuditStore, AutoUnsealStore, HealthStore, LeaseStore, NodeStore, PolicyStore,
    RotationHistoryStore, SecretStore, VaultConfigStore,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS vault_config (
        id INT PRIMARY KEY CHECK (id = 1),
        wrapped_master_key BYTEA NOT NULL,
        key_check_value BYTEA NOT NULL,
        threshold SMALLINT NOT NULL,
        total_shares SMALLINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cluster_nodes (
        node_id TEXT PRIMARY KEY,
        hostname TEXT NOT NULL,
        status TEXT NOT NULL,
        is_leader BOOLEAN NOT NULL DEFAULT FALSE,
        started_at TIMESTAMPTZ NOT NULL,
        last_seen_at TIMESTAMPTZ NOT NULL,
        version TEXT NOT NULL,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb
    )",
    "CREATE TABLE IF NOT EXISTS auto_unseal (
        id UUID PRIMARY KEY,
        provider TEXT NOT NULL,
        key_id TEXT,
        region TEXT,
        encrypted_shares BYTEA[] NOT NULL,
        max_retries INT NOT NULL,
        retry_delay_secs BIGINT NOT NULL,
        active BOOLEAN NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS secrets (
        id UUID PRIMARY KEY,
        path TEXT NOT NULL UNIQUE,
        secret_type TEXT NOT NULL,
        ciphertext BYTEA NOT NULL,
        version BIGINT NOT NULL,
        version_count BIGINT NOT NULL DEFAULT 0,
        last_version_at TIMESTAMPTZ,
        ttl_hint_secs BIGINT,
        rotation JSONB,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS secret_versions (
        id UUID PRIMARY KEY,
        secret_id UUID NOT NULL REFERENCES secrets(id) ON DELETE CASCADE,
        version BIGINT NOT NULL,
        ciphertext BYTEA NOT NULL,
        description TEXT,
        author TEXT,
        archived_at TIMESTAMPTZ NOT NULL,
        UNIQUE (secret_id, version)
    )",
    "CREATE TABLE IF NOT EXISTS policies (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        deny BOOLEAN NOT NULL DEFAULT FALSE,
        document JSONB NOT NULL,
        entity_bindings TEXT[] NOT NULL DEFAULT '{}',
        max_ttl_secs BIGINT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS audit_events (
        event_id UUID PRIMARY KEY,
        sequence BIGINT NOT NULL UNIQUE,
        timestamp TIMESTAMPTZ NOT NULL,
        event_type TEXT NOT NULL,
        actor_type TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        secret_id UUID,
        secret_version BIGINT,
        access_granted BOOLEAN,
        policy_name TEXT,
        denial_reason TEXT,
        source_ip TEXT,
        correlation_id UUID,
        previous_hash TEXT NOT NULL,
        current_hash TEXT NOT NULL,
        signature TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS leases (
        id UUID PRIMARY KEY,
        secret_path TEXT NOT NULL,
        engine_type TEXT NOT NULL,
        credential_ciphertext BYTEA NOT NULL,
        issued_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL,
        revoked BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE TABLE IF NOT EXISTS rotation_history (
        id UUID PRIMARY KEY,
        schedule_id UUID NOT NULL,
        secret_path TEXT NOT NULL,
        started_at TIMESTAMPTZ NOT NULL,
        finished_at TIMESTAMPTZ,
        status TEXT NOT NULL,
        old_version BIGINT,
        new_version BIGINT,
        duration_ms BIGINT,
        error TEXT
    )",
    "CREATE TABLE IF NOT EXISTS node_health (
        id BIGSERIAL PRIMARY KEY,
        node_id TEXT NOT NULL,
        sampled_at TIMESTAMPTZ NOT NULL,
        cpu_percent REAL NOT NULL,
        memory_percent REAL NOT NULL,
        db_latency_ms DOUBLE PRECISION NOT NULL,
        sealed BOOLEAN NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events (timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_node_health_sampled_at ON node_health (sampled_at)",
];

fn ser_err(context: &str, detail: impl fmt::Display) -> StorageError {
    StorageError::Serialization(format!("{context}: {detail}"))
}

fn u32_from_i64(value: i64, context: &str) -> StorageResult<u32> {
    u32::try_from(value).map_err(|_| ser_err(context, value))
}

/// Postgres implementation of every repository trait.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    /// Connect a pool and run schema migration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the pool cannot be
    /// established or migration fails.
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let backend = Self { pool };
        backend.migrate().await?;
        Ok(backend)
    }

    /// The underlying pool (for the lock manager).
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the idempotent schema statements.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for PgBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgBackend").finish_non_exhaustive()
    }
}

fn map_node(row: &PgRow) -> StorageResult<NodeRecord> {
    let status: String = row.try_get("status")?;
    Ok(NodeRecord {
        node_id: NodeId::new(row.try_get::<String, _>("node_id")?),
        hostname: row.try_get("hostname")?,
        status: status
            .parse::<NodeStatus>()
            .map_err(|e| ser_err("node status", e))?,
        is_leader: row.try_get("is_leader")?,
        started_at: row.try_get("started_at")?,
        last_seen_at: row.try_get("last_seen_at")?,
        version: row.try_get("version")?,
        metadata: row.try_get("metadata")?,
    })
}

fn map_secret(row: &PgRow) -> StorageResult<SecretRecord> {
    let path: String = row.try_get("path")?;
    let secret_type: String = row.try_get("secret_type")?;
    Ok(SecretRecord {
        id: SecretId::from_uuid(row.try_get("id")?),
        path: SecretPath::parse(path).map_err(|e| ser_err("secret path", e))?,
        secret_type: secret_type
            .parse::<SecretType>()
            .map_err(|e| ser_err("secret type", e))?,
        ciphertext: row.try_get("ciphertext")?,
        version: u32_from_i64(row.try_get("version")?, "secret version")?,
        version_count: u32_from_i64(row.try_get("version_count")?, "version count")?,
        last_version_at: row.try_get("last_version_at")?,
        ttl_hint_secs: row.try_get("ttl_hint_secs")?,
        rotation: row.try_get("rotation")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_version(row: &PgRow) -> StorageResult<SecretVersionRecord> {
    Ok(SecretVersionRecord {
        id: row.try_get("id")?,
        secret_id: SecretId::from_uuid(row.try_get("secret_id")?),
        version: u32_from_i64(row.try_get("version")?, "archived version")?,
        ciphertext: row.try_get("ciphertext")?,
        description: row.try_get("description")?,
        author: row.try_get("author")?,
        archived_at: row.try_get("archived_at")?,
    })
}

fn map_policy(row: &PgRow) -> StorageResult<PolicyRecord> {
    let bindings: Vec<String> = row.try_get("entity_bindings")?;
    Ok(PolicyRecord {
        id: PolicyId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        deny: row.try_get("deny")?,
        document: row.try_get("document")?,
        entity_bindings: bindings.into_iter().map(EntityId::new).collect(),
        max_ttl_secs: row.try_get("max_ttl_secs")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_audit(row: &PgRow) -> StorageResult<AuditEventRecord> {
    let actor_type: String = row.try_get("actor_type")?;
    let secret_version: Option<i64> = row.try_get("secret_version")?;
    Ok(AuditEventRecord {
        event_id: EventId::from_uuid(row.try_get("event_id")?),
        sequence: u64::try_from(row.try_get::<i64, _>("sequence")?)
            .map_err(|e| ser_err("audit sequence", e))?,
        timestamp: row.try_get("timestamp")?,
        event_type: row.try_get("event_type")?,
        actor_type: actor_type
            .parse::<ActorType>()
            .map_err(|e| ser_err("actor type", e))?,
        actor_id: row.try_get("actor_id")?,
        secret_id: row
            .try_get::<Option<Uuid>, _>("secret_id")?
            .map(SecretId::from_uuid),
        secret_version: secret_version
            .map(|v| u32_from_i64(v, "audit secret version"))
            .transpose()?,
        access_granted: row.try_get("access_granted")?,
        policy_name: row.try_get("policy_name")?,
        denial_reason: row.try_get("denial_reason")?,
        source_ip: row.try_get("source_ip")?,
        correlation_id: row
            .try_get::<Option<Uuid>, _>("correlation_id")?
            .map(CorrelationId::from_uuid),
        previous_hash: row.try_get("previous_hash")?,
        current_hash: row.try_get("current_hash")?,
        signature: row.try_get("signature")?,
    })
}

fn map_lease(row: &PgRow) -> StorageResult<LeaseRecord> {
    let path: String = row.try_get("secret_path")?;
    Ok(LeaseRecord {
        id: LeaseId::from_uuid(row.try_get("id")?),
        secret_path: SecretPath::parse(path).map_err(|e| ser_err("lease path", e))?,
        engine_type: row.try_get("engine_type")?,
        credential_ciphertext: row.try_get("credential_ciphertext")?,
        issued_at: row.try_get("issued_at")?,
        expires_at: row.try_get("expires_at")?,
        revoked: row.try_get("revoked")?,
    })
}

fn map_rotation(row: &PgRow) -> StorageResult<RotationHistoryRecord> {
    let path: String = row.try_get("secret_path")?;
    let old_version: Option<i64> = row.try_get("old_version")?;
    let new_version: Option<i64> = row.try_get("new_version")?;
    Ok(RotationHistoryRecord {
        id: row.try_get("id")?,
        schedule_id: row.try_get("schedule_id")?,
        secret_path: SecretPath::parse(path).map_err(|e| ser_err("rotation path", e))?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        status: row.try_get("status")?,
        old_version: old_version
            .map(|v| u32_from_i64(v, "rotation old version"))
            .transpose()?,
        new_version: new_version
            .map(|v| u32_from_i64(v, "rotation new version"))
            .transpose()?,
        duration_ms: row.try_get("duration_ms")?,
        error: row.try_get("error")?,
    })
}

#[async_trait]
impl VaultConfigStore for PgBackend {
    async fn load(&self) -> StorageResult<Option<VaultConfigRecord>> {
        let row = sqlx::query("SELECT * FROM vault_config WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(VaultConfigRecord {
                wrapped_master_key: row.try_get("wrapped_master_key")?,
                key_check_value: row.try_get("key_check_value")?,
                threshold: u8::try_from(row.try_get::<i16, _>("threshold")?)
                    .map_err(|e| ser_err("threshold", e))?,
                total_shares: u8::try_from(row.try_get::<i16, _>("total_shares")?)
                    .map_err(|e| ser_err("total shares", e))?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn initialize(&self, record: VaultConfigRecord) -> StorageResult<()> {
        let result = sqlx::query(
            "INSERT INTO vault_config
                 (id, wrapped_master_key, key_check_value, threshold, total_shares, created_at)
             VALUES (1, $1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&record.wrapped_master_key)
        .bind(&record.key_check_value)
        .bind(i16::from(record.threshold))
        .bind(i16::from(record.total_shares))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::AlreadyInitialized);
        }
        Ok(())
    }

    async fn destroy(&self) -> StorageResult<()> {
        sqlx::query("DELETE FROM vault_config WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NodeStore for PgBackend {
    async fn upsert(&self, record: NodeRecord) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO cluster_nodes
                 (node_id, hostname, status, is_leader, started_at, last_seen_at, version, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (node_id) DO UPDATE SET
                 hostname = EXCLUDED.hostname,
                 status = EXCLUDED.status,
                 is_leader = EXCLUDED.is_leader,
                 last_seen_at = EXCLUDED.last_seen_at,
                 version = EXCLUDED.version,
                 metadata = EXCLUDED.metadata",
        )
        .bind(record.node_id.as_str())
        .bind(&record.hostname)
        .bind(record.status.to_string())
        .bind(record.is_leader)
        .bind(record.started_at)
        .bind(record.last_seen_at)
        .bind(&record.version)
        .bind(&record.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch(
        &self,
        node_id: &NodeId,
        last_seen_at: DateTime<Utc>,
        status: NodeStatus,
        is_leader: bool,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE cluster_nodes
             SET last_seen_at = $2, status = $3, is_leader = $4
             WHERE node_id = $1",
        )
        .bind(node_id.as_str())
        .bind(last_seen_at)
        .bind(status.to_string())
        .bind(is_leader)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("node {node_id}")));
        }
        Ok(())
    }

    async fn get(&self, node_id: &NodeId) -> StorageResult<Option<NodeRecord>> {
        sqlx::query("SELECT * FROM cluster_nodes WHERE node_id = $1")
            .bind(node_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| map_node(&row))
            .transpose()
    }

    async fn list(&self) -> StorageResult<Vec<NodeRecord>> {
        sqlx::query("SELECT * FROM cluster_nodes ORDER BY node_id")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(map_node)
            .collect()
    }

    async fn sweep_stale(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let result =
            sqlx::query("DELETE FROM cluster_nodes WHERE last_seen_at < $1 AND status <> 'shutdown'")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn remove(&self, node_id: &NodeId) -> StorageResult<()> {
        sqlx::query("DELETE FROM cluster_nodes WHERE node_id = $1")
            .bind(node_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AutoUnsealStore for PgBackend {
    async fn active(&self) -> StorageResult<Option<AutoUnsealRecord>> {
        let row = sqlx::query("SELECT * FROM auto_unseal WHERE active LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(AutoUnsealRecord {
                id: row.try_get("id")?,
                provider: row.try_get("provider")?,
                key_id: row.try_get("key_id")?,
                region: row.try_get("region")?,
                encrypted_shares: row.try_get("encrypted_shares")?,
                max_retries: u32::try_from(row.try_get::<i32, _>("max_retries")?)
                    .map_err(|e| ser_err("max retries", e))?,
                retry_delay_secs: u64::try_from(row.try_get::<i64, _>("retry_delay_secs")?)
                    .map_err(|e| ser_err("retry delay", e))?,
                active: row.try_get("active")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn activate(&self, record: AutoUnsealRecord) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE auto_unseal SET active = FALSE WHERE active")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO auto_unseal
                 (id, provider, key_id, region, encrypted_shares, max_retries,
                  retry_delay_secs, active, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8)",
        )
        .bind(record.id)
        .bind(&record.provider)
        .bind(&record.key_id)
        .bind(&record.region)
        .bind(&record.encrypted_shares)
        .bind(i32::try_from(record.max_retries).unwrap_or(i32::MAX))
        .bind(i64::try_from(record.retry_delay_secs).unwrap_or(i64::MAX))
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn deactivate_all(&self) -> StorageResult<()> {
        sqlx::query("UPDATE auto_unseal SET active = FALSE WHERE active")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for PgBackend {
    async fn insert(&self, record: SecretRecord) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO secrets
                 (id, path, secret_type, ciphertext, version, version_count,
                  last_version_at, ttl_hint_secs, rotation, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.id.0)
        .bind(record.path.as_str())
        .bind(record.secret_type.to_string())
        .bind(&record.ciphertext)
        .bind(i64::from(record.version))
        .bind(i64::from(record.version_count))
        .bind(record.last_version_at)
        .bind(record.ttl_hint_secs)
        .bind(&record.rotation)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: SecretId) -> StorageResult<Option<SecretRecord>> {
        sqlx::query("SELECT * FROM secrets WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| map_secret(&row))
            .transpose()
    }

    async fn get_by_path(&self, path: &SecretPath) -> StorageResult<Option<SecretRecord>> {
        sqlx::query("SELECT * FROM secrets WHERE path = $1")
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| map_secret(&row))
            .transpose()
    }

    async fn archive_then_update(
        &self,
        version: SecretVersionRecord,
        updated: SecretRecord,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO secret_versions
                 (id, secret_id, version, ciphertext, description, author, archived_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(version.id)
        .bind(version.secret_id.0)
        .bind(i64::from(version.version))
        .bind(&version.ciphertext)
        .bind(&version.description)
        .bind(&version.author)
        .bind(version.archived_at)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE secrets
             SET ciphertext = $2, version = $3, version_count = $4,
                 last_version_at = $5, ttl_hint_secs = $6, rotation = $7,
                 secret_type = $8, updated_at = $9
             WHERE id = $1",
        )
        .bind(updated.id.0)
        .bind(&updated.ciphertext)
        .bind(i64::from(updated.version))
        .bind(i64::from(updated.version_count))
        .bind(updated.last_version_at)
        .bind(updated.ttl_hint_secs)
        .bind(&updated.rotation)
        .bind(updated.secret_type.to_string())
        .bind(updated.updated_at)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StorageError::NotFound(format!("secret {}", updated.id)));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, filter: SecretFilter) -> StorageResult<Vec<SecretRecord>> {
        let limit = filter.limit.map_or(i64::MAX, |l| l as i64);
        let offset = filter.offset.unwrap_or(0) as i64;
        sqlx::query(
            "SELECT * FROM secrets
             WHERE ($1::text IS NULL OR secret_type = $1)
               AND ($2::text IS NULL OR path LIKE $2 || '%')
             ORDER BY path
             LIMIT $3 OFFSET $4",
        )
        .bind(filter.secret_type.map(|t| t.to_string()))
        .bind(filter.path_prefix)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(map_secret)
        .collect()
    }

    async fn delete(&self, id: SecretId) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM secrets WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("secret {id}")));
        }
        Ok(())
    }

    async fn versions(&self, secret_id: SecretId) -> StorageResult<Vec<SecretVersionRecord>> {
        sqlx::query("SELECT * FROM secret_versions WHERE secret_id = $1 ORDER BY version")
            .bind(secret_id.0)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(map_version)
            .collect()
    }

    async fn get_version(
        &self,
        secret_id: SecretId,
        version: u32,
    ) -> StorageResult<Option<SecretVersionRecord>> {
        sqlx::query("SELECT * FROM secret_versions WHERE secret_id = $1 AND version = $2")
            .bind(secret_id.0)
            .bind(i64::from(version))
            .fetch_optional(&self.pool)
            .await?
            .map(|row| map_version(&row))
            .transpose()
    }

    async fn delete_versions(&self, secret_id: SecretId, versions: &[u32]) -> StorageResult<u64> {
        let targets: Vec<i64> = versions.iter().map(|v| i64::from(*v)).collect();
        let result =
            sqlx::query("DELETE FROM secret_versions WHERE secret_id = $1 AND version = ANY($2)")
                .bind(secret_id.0)
                .bind(&targets)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn set_version_count(&self, secret_id: SecretId, count: u32) -> StorageResult<()> {
        let result = sqlx::query("UPDATE secrets SET version_count = $2 WHERE id = $1")
            .bind(secret_id.0)
            .bind(i64::from(count))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("secret {secret_id}")));
        }
        Ok(())
    }

    async fn count(&self) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM secrets")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl PolicyStore for PgBackend {
    async fn insert(&self, record: PolicyRecord) -> StorageResult<()> {
        let bindings: Vec<String> = record
            .entity_bindings
            .iter()
            .map(|e| e.0.clone())
            .collect();
        sqlx::query(
            "INSERT INTO policies
                 (id, name, description, deny, document, entity_bindings,
                  max_ttl_secs, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id.0)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.deny)
        .bind(&record.document)
        .bind(&bindings)
        .bind(record.max_ttl_secs)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, record: PolicyRecord) -> StorageResult<()> {
        let bindings: Vec<String> = record
            .entity_bindings
            .iter()
            .map(|e| e.0.clone())
            .collect();
        let result = sqlx::query(
            "UPDATE policies
             SET name = $2, description = $3, deny = $4, document = $5,
                 entity_bindings = $6, max_ttl_secs = $7, updated_at = $8
             WHERE id = $1",
        )
        .bind(record.id.0)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.deny)
        .bind(&record.document)
        .bind(&bindings)
        .bind(record.max_ttl_secs)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("policy {}", record.id)));
        }
        Ok(())
    }

    async fn get(&self, id: PolicyId) -> StorageResult<Option<PolicyRecord>> {
        sqlx::query("SELECT * FROM policies WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| map_policy(&row))
            .transpose()
    }

    async fn get_by_name(&self, name: &str) -> StorageResult<Option<PolicyRecord>> {
        sqlx::query("SELECT * FROM policies WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| map_policy(&row))
            .transpose()
    }

    async fn list(&self) -> StorageResult<Vec<PolicyRecord>> {
        sqlx::query("SELECT * FROM policies ORDER BY name")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(map_policy)
            .collect()
    }

    async fn delete(&self, id: PolicyId) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM policies WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("policy {id}")));
        }
        Ok(())
    }

    async fn for_entity(&self, entity: &EntityId) -> StorageResult<Vec<PolicyRecord>> {
        sqlx::query(
            "SELECT * FROM policies
             WHERE entity_bindings = '{}' OR $1 = ANY(entity_bindings)
             ORDER BY name",
        )
        .bind(&entity.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(map_policy)
        .collect()
    }
}

#[async_trait]
impl AuditStore for PgBackend {
    async fn last(&self) -> StorageResult<Option<AuditEventRecord>> {
        sqlx::query("SELECT * FROM audit_events ORDER BY sequence DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?
            .map(|row| map_audit(&row))
            .transpose()
    }

    async fn append(&self, event: AuditEventRecord) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO audit_events
                 (event_id, sequence, timestamp, event_type, actor_type, actor_id,
                  secret_id, secret_version, access_granted, policy_name,
                  denial_reason, source_ip, correlation_id,
                  previous_hash, current_hash, signature)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(event.event_id.0)
        .bind(i64::try_from(event.sequence).map_err(|e| ser_err("sequence", e))?)
        .bind(event.timestamp)
        .bind(&event.event_type)
        .bind(event.actor_type.to_string())
        .bind(&event.actor_id)
        .bind(event.secret_id.map(|s| s.0))
        .bind(event.secret_version.map(i64::from))
        .bind(event.access_granted)
        .bind(&event.policy_name)
        .bind(&event.denial_reason)
        .bind(&event.source_ip)
        .bind(event.correlation_id.map(|c| c.0))
        .bind(&event.previous_hash)
        .bind(&event.current_hash)
        .bind(&event.signature)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scan(&self, from: u64, limit: usize) -> StorageResult<Vec<AuditEventRecord>> {
        sqlx::query("SELECT * FROM audit_events WHERE sequence >= $1 ORDER BY sequence LIMIT $2")
            .bind(i64::try_from(from).unwrap_or(i64::MAX))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(map_audit)
            .collect()
    }

    async fn search(&self, query: &AuditQuery) -> StorageResult<Vec<AuditEventRecord>> {
        let limit = query.limit.unwrap_or(100) as i64;
        let offset = query.offset.unwrap_or(0) as i64;
        sqlx::query(
            "SELECT * FROM audit_events
             WHERE ($1::text IS NULL OR event_type = $1)
               AND ($2::text IS NULL OR actor_type = $2)
               AND ($3::text IS NULL OR actor_id = $3)
               AND ($4::uuid IS NULL OR secret_id = $4)
               AND ($5::boolean IS NULL OR access_granted = $5)
               AND ($6::uuid IS NULL OR correlation_id = $6)
               AND ($7::timestamptz IS NULL OR timestamp >= $7)
               AND ($8::timestamptz IS NULL OR timestamp <= $8)
             ORDER BY timestamp DESC, sequence DESC
             LIMIT $9 OFFSET $10",
        )
        .bind(&query.event_type)
        .bind(query.actor_type.map(|t| t.to_string()))
        .bind(&query.actor_id)
        .bind(query.secret_id.map(|s| s.0))
        .bind(query.access_granted)
        .bind(query.correlation_id.map(|c| c.0))
        .bind(query.from)
        .bind(query.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(map_audit)
        .collect()
    }

    async fn count(&self) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl LeaseStore for PgBackend {
    async fn insert(&self, record: LeaseRecord) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO leases
                 (id, secret_path, engine_type, credential_ciphertext,
                  issued_at, expires_at, revoked)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id.0)
        .bind(record.secret_path.as_str())
        .bind(&record.engine_type)
        .bind(&record.credential_ciphertext)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.revoked)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: LeaseId) -> StorageResult<Option<LeaseRecord>> {
        sqlx::query("SELECT * FROM leases WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| map_lease(&row))
            .transpose()
    }

    async fn update_expiry(&self, id: LeaseId, expires_at: DateTime<Utc>) -> StorageResult<()> {
        let result = sqlx::query("UPDATE leases SET expires_at = $2 WHERE id = $1")
            .bind(id.0)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("lease {id}")));
        }
        Ok(())
    }

    async fn revoke(&self, id: LeaseId) -> StorageResult<()> {
        let result = sqlx::query("UPDATE leases SET revoked = TRUE WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("lease {id}")));
        }
        Ok(())
    }

    async fn delete(&self, id: LeaseId) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM leases WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("lease {id}")));
        }
        Ok(())
    }

    async fn expiring(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<LeaseRecord>> {
        sqlx::query(
            "SELECT * FROM leases WHERE NOT revoked AND expires_at <= $1 ORDER BY expires_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(map_lease)
        .collect()
    }
}

#[async_trait]
impl RotationHistoryStore for PgBackend {
    async fn insert(&self, record: RotationHistoryRecord) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO rotation_history
                 (id, schedule_id, secret_path, started_at, finished_at, status,
                  old_version, new_version, duration_ms, error)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id)
        .bind(record.schedule_id)
        .bind(record.secret_path.as_str())
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(&record.status)
        .bind(record.old_version.map(i64::from))
        .bind(record.new_version.map(i64::from))
        .bind(record.duration_ms)
        .bind(&record.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, record: RotationHistoryRecord) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE rotation_history
             SET finished_at = $2, status = $3, old_version = $4,
                 new_version = $5, duration_ms = $6, error = $7
             WHERE id = $1",
        )
        .bind(record.id)
        .bind(record.finished_at)
        .bind(&record.status)
        .bind(record.old_version.map(i64::from))
        .bind(record.new_version.map(i64::from))
        .bind(record.duration_ms)
        .bind(&record.error)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("rotation run {}", record.id)));
        }
        Ok(())
    }

    async fn for_schedule(&self, schedule_id: Uuid) -> StorageResult<Vec<RotationHistoryRecord>> {
        sqlx::query(
            "SELECT * FROM rotation_history WHERE schedule_id = $1 ORDER BY started_at DESC",
        )
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(map_rotation)
        .collect()
    }
}

#[async_trait]
impl HealthStore for PgBackend {
    async fn insert(&self, sample: HealthSample) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO node_health
                 (node_id, sampled_at, cpu_percent, memory_percent, db_latency_ms, sealed)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(sample.node_id.as_str())
        .bind(sample.sampled_at)
        .bind(sample.cpu_percent)
        .bind(sample.memory_percent)
        .bind(sample.db_latency_ms)
        .bind(sample.sealed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, node_id: &NodeId, limit: usize) -> StorageResult<Vec<HealthSample>> {
        sqlx::query(
            "SELECT * FROM node_health WHERE node_id = $1 ORDER BY sampled_at DESC LIMIT $2",
        )
        .bind(node_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(HealthSample {
                node_id: NodeId::new(row.try_get::<String, _>("node_id")?),
                sampled_at: row.try_get("sampled_at")?,
                cpu_percent: row.try_get("cpu_percent")?,
                memory_percent: row.try_get("memory_percent")?,
                db_latency_ms: row.try_get("db_latency_ms")?,
                sealed: row.try_get("sealed")?,
            })
        })
        .collect()
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM node_health WHERE sampled_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Advisory lock manager
// ---------------------------------------------------------------------------

struct PgHolder {
    name: LockName,
    mode: LockMode,
    conn: PoolConnection<Postgres>,
    acquired_at: DateTime<Utc>,
}

/// Lock manager backed by Postgres advisory locks.
///
/// Session-mode locks hold a dedicated pool connection for their lifetime;
/// losing that connection (crash, partition) releases the lock server-side,
/// which is the observability leader election relies on.
/// Transactional-mode locks wrap `pg_try_advisory_xact_lock` in an explicit
/// transaction on the held connection and release at commit.
pub struct PgLockManager {
    pool: PgPool,
    holders: tokio::sync::Mutex<HashMap<Uuid, PgHolder>>,
}

impl PgLockManager {
    /// Create a lock manager over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            holders: tokio::sync::Mutex::new(HashMap::new()),
        }
    }
}

impl fmt::Debug for PgLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgLockManager").finish_non_exhaustive()
    }
}

async fn pg_try_acquire_on_conn(
    conn: &mut PgConnection,
    name: LockName,
    mode: LockMode,
) -> StorageResult<bool> {
    let _ = mode;
    Ok(sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
        .bind(name.key())
        .fetch_one(conn)
        .await?)
}

async fn pg_release_on_conn(
    conn: &mut PgConnection,
    name: LockName,
    mode: LockMode,
) -> StorageResult<ReleaseOutcome> {
    let _ = mode;
    let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
        .bind(name.key())
        .fetch_one(conn)
        .await
        .unwrap_or(false);
    if released {
        Ok(ReleaseOutcome::Released)
    } else {
        Ok(ReleaseOutcome::NotHeld)
    }
}

#[async_trait]
impl LockManager for PgLockManager {
    async fn try_acquire(
        &self,
        name: LockName,
        mode: LockMode,
    ) -> StorageResult<Option<LockHandle>> {
        let mut conn = self.pool.acquire().await?;
        let granted: bool = pg_try_acquire_on_conn(&mut conn, name, mode).await?;

        if !granted {
            return Ok(None);
        }

        let session = Uuid::new_v4();
        self.holders.lock().await.insert(
            session,
            PgHolder {
                name,
                mode,
                conn,
                acquired_at: Utc::now(),
            },
        );
        Ok(Some(LockHandle {
            name,
            mode,
            session,
        }))
    }

    async fn release(&self, handle: &LockHandle) -> StorageResult<ReleaseOutcome> {
        let Some(mut holder) = self.holders.lock().await.remove(&handle.session) else {
            return Ok(ReleaseOutcome::NotHeld);
        };
        pg_release_on_conn(&mut holder.conn, holder.name, holder.mode).await
    }

    async fn is_locked(&self, name: LockName) -> StorageResult<bool> {
        let key = name.key();
        let hi = (key >> 32) & 0xFFFF_FFFF;
        let lo = key & 0xFFFF_FFFF;
        let locked: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM pg_locks
                 WHERE locktype = 'advisory'
                   AND classid = $1::bigint::oid
                   AND objid = $2::bigint::oid
                   AND granted
             )",
        )
        .bind(hi)
        .bind(lo)
        .fetch_one(&self.pool)
        .await?;
        Ok(locked)
    }

    async fn is_held(&self, handle: &LockHandle) -> StorageResult<bool> {
        let mut holders = self.holders.lock().await;
        let Some(holder) = holders.get_mut(&handle.session) else {
            return Ok(false);
        };
        // A dead connection has lost the lock server-side.
        let alive = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&mut *holder.conn)
            .await
            .is_ok();
        if !alive {
            holders.remove(&handle.session);
        }
        Ok(alive)
    }

    async fn list(&self) -> StorageResult<Vec<LockInfo>> {
        let rows = sqlx::query(
            "SELECT classid::bigint AS hi, objid::bigint AS lo, pid
             FROM pg_locks
             WHERE locktype = 'advisory' AND granted",
        )
        .fetch_all(&self.pool)
        .await?;

        let holders = self.holders.lock().await;
        let mut infos = Vec::with_capacity(rows.len());
        for row in rows {
            let hi: i64 = row.try_get("hi")?;
            let lo: i64 = row.try_get("lo")?;
            let pid: i32 = row.try_get("pid")?;
            let key = (hi << 32) | lo;
            let Some(name) = LockName::from_key(key) else {
                continue;
            };
            let acquired_at = holders
                .values()
                .find(|h| h.name == name)
                .map_or_else(Utc::now, |h| h.acquired_at);
            infos.push(LockInfo {
                name,
                key,
                holder: format!("pid:{pid}"),
                acquired_at,
            });
        }
        Ok(infos)
    }
}





