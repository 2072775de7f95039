//! Named cluster-wide advisory locks.
//!
//! A fixed table of well-known lock names (`init`, `unseal`,
//! `master_key_rotation`, `backup`, `auto_unseal`, `leader`) plus a
//! reserved custom integer range. Two modes:
//!
//! - **Session**: held until explicit release or loss of the holding
//!   session (connection). Used for leader election.
//! - **Transactional**: scoped to a short critical section; released when
//!   the section ends.
//!
//! Lock loss must be observable: [`LockGuard::verify`] reports whether the
//! session still holds the lock, which is what lets a node that believed
//! itself leader demote itself after a crash or partition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// First key of the custom lock range; well-known names use keys below it.
pub const CUSTOM_LOCK_BASE: i64 = 10_000;

/// Interval between acquire probes.
pub const LOCK_PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Well-known cluster lock names plus the custom range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockName {
    /// Serializes cluster initialization.
    Init,
    /// Serializes manual unseal ceremonies.
    Unseal,
    /// Serializes master key rotation.
    MasterKeyRotation,
    /// Serializes backups.
    Backup,
    /// Serializes startup auto-unseal.
    AutoUnseal,
    /// Leader election (session mode).
    Leader,
    /// Application-defined lock in the reserved custom range.
    Custom(u32),
}

impl LockName {
    /// The numeric lock key. Well-known names map to 1–6; custom names
    /// live at [`CUSTOM_LOCK_BASE`]` + n`, disjoint by construction.
    #[must_use]
    pub const fn key(self) -> i64 {
        match self {
            Self::Init => 1,
            Self::Unseal => 2,
            Self::MasterKeyRotation => 3,
            Self::Backup => 4,
            Self::AutoUnseal => 5,
            Self::Leader => 6,
            Self::Custom(n) => CUSTOM_LOCK_BASE + n as i64,
        }
    }

    /// Reverse of [`LockName::key`].
    #[must_use]
    pub const fn from_key(key: i64) -> Option<Self> {
        match key {
            1 => Some(Self::Init),
            2 => Some(Self::Unseal),
            3 => Some(Self::MasterKeyRotation),
            4 => Some(Self::Backup),
            5 => Some(Self::AutoUnseal),
            6 => Some(Self::Leader),
            k if k >= CUSTOM_LOCK_BASE && k <= CUSTOM_LOCK_BASE + u32::MAX as i64 => {
                Some(Self::Custom((k - CUSTOM_LOCK_BASE) as u32))
            },
            _ => None,
        }
    }
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Unseal => write!(f, "unseal"),
            Self::MasterKeyRotation => write!(f, "master_key_rotation"),
            Self::Backup => write!(f, "backup"),
            Self::AutoUnseal => write!(f, "auto_unseal"),
            Self::Leader => write!(f, "leader"),
            Self::Custom(n) => write!(f, "custom:{n}"),
        }
    }
}

/// How long a lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Until explicit release or session loss.
    Session,
    /// Until the surrounding critical section ends.
    Transactional,
}

/// Proof of an acquired lock. Plain data; pair it with the manager that
/// issued it (usually via [`LockGuard`]).
#[derive(Debug, Clone)]
pub struct LockHandle {
    /// The lock this handle refers to.
    pub name: LockName,
    /// Acquisition mode.
    pub mode: LockMode,
    /// The holding session.
    pub session: Uuid,
}

/// Outcome of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The lock was held by this session and is now free.
    Released,
    /// The lock had already been lost (session severed or stolen).
    NotHeld,
}

/// One row of [`LockManager::list`] output.
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// Lock name.
    pub name: LockName,
    /// Numeric key.
    pub key: i64,
    /// Holder description (session ID or backend PID).
    pub holder: String,
    /// When the lock was taken.
    pub acquired_at: DateTime<Utc>,
}

/// A named cluster-wide advisory mutex.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// One acquisition attempt; `None` means the lock is busy.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn try_acquire(&self, name: LockName, mode: LockMode)
    -> StorageResult<Option<LockHandle>>;

    /// Release a held lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn release(&self, handle: &LockHandle) -> StorageResult<ReleaseOutcome>;

    /// Whether anyone currently holds `name`. Advisory and race-prone;
    /// use only for telemetry and leader-loss detection.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn is_locked(&self, name: LockName) -> StorageResult<bool>;

    /// Whether `handle`'s session still holds its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn is_held(&self, handle: &LockHandle) -> StorageResult<bool>;

    /// Enumerate current holders for debugging.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn list(&self) -> StorageResult<Vec<LockInfo>>;
}

/// Acquire `name`, probing every [`LOCK_PROBE_INTERVAL`] until `timeout`.
///
/// # Errors
///
/// Returns [`StorageError::LockTimeout`] if the lock stayed busy for the
/// whole window, or any backend error from the probe.
pub async fn acquire(
    manager: Arc<dyn LockManager>,
    name: LockName,
    mode: LockMode,
    timeout: Duration,
) -> StorageResult<LockGuard> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(handle) = manager.try_acquire(name, mode).await? {
            return Ok(LockGuard {
                manager,
                handle: Some(handle),
            });
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Err(StorageError::LockTimeout(name.to_string()));
        }
        tokio::time::sleep(LOCK_PROBE_INTERVAL.min(deadline - now)).await;
    }
}

/// Run `f` under `name`, releasing on every exit path (return, error,
/// panic, cancellation).
///
/// # Errors
///
/// Returns [`StorageError::LockTimeout`] if the lock was not acquired in
/// time; otherwise `f`'s output.
pub async fn with_lock<F, Fut, T>(
    manager: Arc<dyn LockManager>,
    name: LockName,
    timeout: Duration,
    f: F,
) -> StorageResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let guard = acquire(manager, name, LockMode::Session, timeout).await?;
    let result = f().await;
    // Best effort explicit release; the guard's Drop covers panics and
    // cancellation between acquire and here.
    let _ = guard.release().await;
    Ok(result)
}

/// RAII wrapper pairing a [`LockHandle`] with its manager. Dropping the
/// guard schedules a release if one has not happened explicitly.
pub struct LockGuard {
    manager: Arc<dyn LockManager>,
    handle: Option<LockHandle>,
}

impl LockGuard {
    /// The underlying handle.
    ///
    /// # Panics
    ///
    /// Never panics; the handle is only taken by consuming methods.
    #[must_use]
    pub fn handle(&self) -> &LockHandle {
        self.handle
            .as_ref()
            .expect("guard handle present until consumed")
    }

    /// Whether this guard's session still holds the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn verify(&self) -> StorageResult<bool> {
        match &self.handle {
            Some(handle) => self.manager.is_held(handle).await,
            None => Ok(false),
        }
    }

    /// Explicitly release the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; [`ReleaseOutcome::NotHeld`]
    /// if the lock had already been lost.
    pub async fn release(mut self) -> StorageResult<ReleaseOutcome> {
        match self.handle.take() {
            Some(handle) => self.manager.release(&handle).await,
            None => Ok(ReleaseOutcome::NotHeld),
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take()
            && let Ok(rt) = tokio::runtime::Handle::try_current()
        {
            let manager = Arc::clone(&self.manager);
            rt.spawn(async move {
                if let Err(error) = manager.release(&handle).await {
                    tracing::warn!(lock = %handle.name, %error, "lock release on drop failed");
                }
            });
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

struct MemoryHolder {
    name: LockName,
    session: Uuid,
    acquired_at: DateTime<Utc>,
}

/// Process-local lock manager with explicit sessions.
///
/// Used by the in-memory backend and by tests; [`MemoryLockManager::kill_session`]
/// severs a session the way a crashed connection would, so failover paths
/// can be exercised deterministically.
#[derive(Default)]
pub struct MemoryLockManager {
    holders: Mutex<HashMap<i64, MemoryHolder>>,
}

impl MemoryLockManager {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sever a session: every lock it holds is dropped, as if the backing
    /// connection died. Returns how many locks were freed.
    pub fn kill_session(&self, session: Uuid) -> usize {
        let mut holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);
        let before = holders.len();
        holders.retain(|_, holder| holder.session != session);
        before - holders.len()
    }
}

impl fmt::Debug for MemoryLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLockManager").finish_non_exhaustive()
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn try_acquire(
        &self,
        name: LockName,
        mode: LockMode,
    ) -> StorageResult<Option<LockHandle>> {
        let mut holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);
        if holders.contains_key(&name.key()) {
            return Ok(None);
        }
        let session = Uuid::new_v4();
        holders.insert(
            name.key(),
            MemoryHolder {
                name,
                session,
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
        let mut holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);
        match holders.get(&handle.name.key()) {
            Some(holder) if holder.session == handle.session => {
                holders.remove(&handle.name.key());
                Ok(ReleaseOutcome::Released)
            },
            _ => Ok(ReleaseOutcome::NotHeld),
        }
    }

    async fn is_locked(&self, name: LockName) -> StorageResult<bool> {
        let holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(holders.contains_key(&name.key()))
    }

    async fn is_held(&self, handle: &LockHandle) -> StorageResult<bool> {
        let holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(holders
            .get(&handle.name.key())
            .is_some_and(|holder| holder.session == handle.session))
    }

    async fn list(&self) -> StorageResult<Vec<LockInfo>> {
        let holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(holders
            .values()
            .map(|holder| LockInfo {
                name: holder.name,
                key: holder.name.key(),
                holder: holder.session.to_string(),
                acquired_at: holder.acquired_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Arc<dyn LockManager> {
        Arc::new(MemoryLockManager::new())
    }

    #[test]
    fn test_lock_keys_disjoint() {
        let well_known = [
            LockName::Init,
            LockName::Unseal,
            LockName::MasterKeyRotation,
            LockName::Backup,
            LockName::AutoUnseal,
            LockName::Leader,
        ];
        for name in well_known {
            assert!(name.key() < CUSTOM_LOCK_BASE);
            assert_eq!(LockName::from_key(name.key()), Some(name));
        }
        assert_eq!(LockName::Custom(0).key(), CUSTOM_LOCK_BASE);
        assert_eq!(
            LockName::from_key(CUSTOM_LOCK_BASE + 7),
            Some(LockName::Custom(7))
        );
        assert_eq!(LockName::from_key(99), None);
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let manager = manager();
        let guard = acquire(
            Arc::clone(&manager),
            LockName::Init,
            LockMode::Session,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert!(manager.is_locked(LockName::Init).await.unwrap());
        assert!(guard.verify().await.unwrap());

        assert_eq!(guard.release().await.unwrap(), ReleaseOutcome::Released);
        assert!(!manager.is_locked(LockName::Init).await.unwrap());
    }

    #[tokio::test]
    async fn test_contended_acquire_times_out() {
        let manager = manager();
        let _guard = acquire(
            Arc::clone(&manager),
            LockName::Leader,
            LockMode::Session,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let result = acquire(
            Arc::clone(&manager),
            LockName::Leader,
            LockMode::Session,
            Duration::from_millis(250),
        )
        .await;
        assert!(matches!(result, Err(StorageError::LockTimeout(_))));
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_exit() {
        let manager = manager();
        let out = with_lock(
            Arc::clone(&manager),
            LockName::Backup,
            Duration::from_secs(1),
            || async { 42 },
        )
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert!(!manager.is_locked(LockName::Backup).await.unwrap());
    }

    #[tokio::test]
    async fn test_killed_session_observable() {
        let memory = Arc::new(MemoryLockManager::new());
        let manager: Arc<dyn LockManager> = Arc::clone(&memory) as Arc<dyn LockManager>;

        let guard = acquire(
            Arc::clone(&manager),
            LockName::Leader,
            LockMode::Session,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        let session = guard.handle().session;

        assert_eq!(memory.kill_session(session), 1);
        assert!(!guard.verify().await.unwrap());
        assert_eq!(guard.release().await.unwrap(), ReleaseOutcome::NotHeld);

        // The lock is free for another holder now.
        let other = acquire(
            Arc::clone(&manager),
            LockName::Leader,
            LockMode::Session,
            Duration::from_millis(200),
        )
        .await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_list_reports_holders() {
        let manager = manager();
        let _a = acquire(
            Arc::clone(&manager),
            LockName::Init,
            LockMode::Session,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        let _b = acquire(
            Arc::clone(&manager),
            LockName::Custom(3),
            LockMode::Transactional,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let mut names: Vec<String> = manager
            .list()
            .await
            .unwrap()
            .iter()
            .map(|info| info.name.to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["custom:3", "init"]);
    }
}
