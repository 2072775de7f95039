//! The chain writer and verifier.
//!
//! Appends are strictly serialized by the chain's own mutex so sequence
//! numbers and hash links are assigned in commit order. Each event:
//!
//! 1. reads the last entry;
//! 2. takes `sequence = prior + 1` and `previous_hash = prior.current_hash`
//!    (`"GENESIS"` for the first entry);
//! 3. canonically serializes the fact-bearing fields, `|`-delimited, in a
//!    fixed order;
//! 4. sets `current_hash = SHA-256(canonical)` (hex);
//! 5. signs `event_id || sequence || current_hash` with HMAC-SHA-256
//!    under the audit key;
//! 6. inserts the row. The unique constraint on `sequence` turns a lost
//!    race into a conflict instead of a forked chain.
//!
//! Append failures are never swallowed: the caller's operation must fail
//! with them. The only exception is the explicit [`AuditMode::Disabled`],
//! reserved for boot-time paths in test configurations.

use chrono::{SecondsFormat, Utc};
use secrethub_core::EventId;
use secrethub_core::config::AuditSection;
use secrethub_crypto::{hmac_sha256, hmac_verify};
use secrethub_storage::{AuditEventRecord, AuditQuery, AuditStore};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::warn;
use zeroize::Zeroizing;

use crate::error::{AuditError, AuditResult};
use crate::event::AuditEventDraft;

/// `previous_hash` of the first event in the chain.
pub const GENESIS_HASH: &str = "GENESIS";

/// Key material substituted when `dev_mode` is set and no key is
/// configured. Rejected outside dev mode.
const DEV_KEY_MATERIAL: &str = "secrethub-dev-audit-hmac-key";

/// Batch size for chain verification scans.
const VERIFY_BATCH: usize = 500;

/// Whether the chain is writing or explicitly disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditMode {
    /// Appends are persisted and failures propagate.
    Enforced,
    /// Appends no-op. Only valid when the configuration explicitly allows
    /// it (boot-time paths in tests).
    Disabled,
}

/// Result of a successful chain verification.
#[derive(Debug, Clone, Copy)]
pub struct ChainVerification {
    /// Number of events checked.
    pub events_verified: u64,
}

/// The tamper-evident audit log.
pub struct AuditChain {
    store: Arc<dyn AuditStore>,
    key: Zeroizing<Vec<u8>>,
    mode: AuditMode,
    write_lock: tokio::sync::Mutex<()>,
}

impl AuditChain {
    /// Build a chain with an explicit HMAC key.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>, hmac_key: &[u8]) -> Self {
        Self {
            store,
            key: Zeroizing::new(hmac_key.to_vec()),
            mode: AuditMode::Enforced,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Build a chain from configuration, applying the keying policy: a
    /// missing key is a hard error unless `dev_mode` is set, and the
    /// disabled mode requires `allow_disabled`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::MissingHmacKey`] when no key is configured
    /// in production mode.
    pub fn from_config(store: Arc<dyn AuditStore>, section: &AuditSection) -> AuditResult<Self> {
        let key: Zeroizing<Vec<u8>> = match (&section.hmac_key, section.dev_mode) {
            (Some(key), _) => Zeroizing::new(key.as_bytes().to_vec()),
            (None, true) => {
                warn!("audit chain using fixed development HMAC key; never run this in production");
                Zeroizing::new(DEV_KEY_MATERIAL.as_bytes().to_vec())
            },
            (None, false) => return Err(AuditError::MissingHmacKey),
        };

        let mode = if section.allow_disabled {
            warn!("audit chain disabled by configuration; events will not be recorded");
            AuditMode::Disabled
        } else {
            AuditMode::Enforced
        };

        Ok(Self {
            store,
            key,
            mode,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// The active mode.
    #[must_use]
    pub fn mode(&self) -> AuditMode {
        self.mode
    }

    /// Append one event. Returns the persisted record, or `None` in
    /// [`AuditMode::Disabled`].
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::WriteFailure`] if the row cannot be
    /// persisted; the caller must abort the operation that produced the
    /// event.
    pub async fn append(&self, draft: AuditEventDraft) -> AuditResult<Option<AuditEventRecord>> {
        if self.mode == AuditMode::Disabled {
            return Ok(None);
        }

        let _serialized = self.write_lock.lock().await;

        let prior = self.store.last().await?;
        let (sequence, previous_hash) = match &prior {
            Some(last) => (last.sequence + 1, last.current_hash.clone()),
            None => (1, GENESIS_HASH.to_string()),
        };

        let mut event = AuditEventRecord {
            event_id: EventId::new(),
            sequence,
            timestamp: Utc::now(),
            event_type: draft.event_type.as_str().to_string(),
            actor_type: draft.actor.actor_type,
            actor_id: draft.actor.actor_id,
            secret_id: draft.secret_id,
            secret_version: draft.secret_version,
            access_granted: draft.access_granted,
            policy_name: draft.policy_name,
            denial_reason: draft.denial_reason,
            source_ip: draft.source_ip,
            correlation_id: draft.correlation_id,
            previous_hash,
            current_hash: String::new(),
            signature: String::new(),
        };
        event.current_hash = content_hash(&event);
        event.signature = self.sign(&event, &event.current_hash);

        self.store
            .append(event.clone())
            .await
            .map_err(|e| AuditError::WriteFailure(e.to_string()))?;

        Ok(Some(event))
    }

    /// Walk the whole chain and check sequence continuity, hash links,
    /// signatures, and content hashes.
    ///
    /// # Errors
    ///
    /// Returns the first [`AuditError`] chain violation found, or a
    /// storage error if reading fails.
    pub async fn verify_chain(&self) -> AuditResult<ChainVerification> {
        let mut checked: u64 = 0;
        let mut prior: Option<AuditEventRecord> = None;
        let mut cursor: u64 = 0;

        loop {
            let batch = self.store.scan(cursor, VERIFY_BATCH).await?;
            if batch.is_empty() {
                break;
            }
            cursor = batch[batch.len() - 1].sequence + 1;

            for event in batch {
                match &prior {
                    None => {
                        if event.sequence != 1 {
                            return Err(AuditError::BadGenesis(event.sequence));
                        }
                        if event.previous_hash != GENESIS_HASH {
                            return Err(AuditError::ChainBroken(event.sequence));
                        }
                    },
                    Some(previous) => {
                        if event.sequence != previous.sequence + 1 {
                            return Err(AuditError::SequenceGap {
                                expected: previous.sequence + 1,
                                found: event.sequence,
                            });
                        }
                        // Link against the *recomputed* hash of the prior
                        // event, so a mutated row is caught by its
                        // successor's link.
                        if event.previous_hash != content_hash(previous) {
                            return Err(AuditError::ChainBroken(event.sequence));
                        }
                    },
                }

                if !self.verify_signature(&event) {
                    return Err(AuditError::InvalidSignature(event.sequence));
                }

                checked += 1;
                prior = Some(event);
            }
        }

        // The last event has no successor to vouch for it; compare its
        // stored hash against its content directly.
        if let Some(last) = &prior
            && content_hash(last) != last.current_hash
        {
            return Err(AuditError::HashMismatch(last.sequence));
        }

        Ok(ChainVerification {
            events_verified: checked,
        })
    }

    /// Filtered search, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn search(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEventRecord>> {
        Ok(self.store.search(query).await?)
    }

    /// Total number of events.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the count fails.
    pub async fn count(&self) -> AuditResult<u64> {
        Ok(self.store.count().await?)
    }

    /// Search and render the matches as the canonical CSV document.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn export_csv(&self, query: &AuditQuery) -> AuditResult<String> {
        let events = self.store.search(query).await?;
        Ok(crate::export::to_csv(&events))
    }

    fn sign(&self, event: &AuditEventRecord, current_hash: &str) -> String {
        let message = format!("{}{}{}", event.event_id, event.sequence, current_hash);
        hex::encode(hmac_sha256(&self.key, message.as_bytes()))
    }

    fn verify_signature(&self, event: &AuditEventRecord) -> bool {
        let message = format!(
            "{}{}{}",
            event.event_id, event.sequence, event.current_hash
        );
        let Ok(signature) = hex::decode(&event.signature) else {
            return false;
        };
        hmac_verify(&self.key, message.as_bytes(), &signature)
    }
}

impl fmt::Debug for AuditChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditChain")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Canonical serialization of the fact-bearing fields: a fixed order,
/// `|`-delimited, absent optionals as empty strings.
fn canonical(event: &AuditEventRecord) -> String {
    let optional = |value: Option<String>| value.unwrap_or_default();
    [
        event.event_id.to_string(),
        event.sequence.to_string(),
        event
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true),
        event.event_type.clone(),
        event.actor_type.to_string(),
        event.actor_id.clone(),
        optional(event.secret_id.map(|id| id.to_string())),
        optional(event.secret_version.map(|v| v.to_string())),
        optional(event.access_granted.map(|g| g.to_string())),
        event.policy_name.clone().unwrap_or_default(),
        event.denial_reason.clone().unwrap_or_default(),
        event.source_ip.clone().unwrap_or_default(),
        optional(event.correlation_id.map(|id| id.to_string())),
    ]
    .join("|")
}

/// `SHA-256(canonical)` as lowercase hex.
fn content_hash(event: &AuditEventRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical(event).as_bytes());
    hex::encode(hasher.finalize())
}
