//! Named leases: backends and the lock manager.
//!
//! A lease is acquired by inserting a record under its name. Inserting over
//! a live lease fails with [`LockError::AlreadyHeld`]; an expired lease is
//! force-released and the insert retried once. Guards release their lease on
//! drop, but only if the stored lease still carries their lock id.

use edms_core::{
    hex_digest, Acquired, EdmsResult, Lock, LockData, LockError, LockId, StoredLock, Timestamp,
};
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// Result of trying to insert a lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another lease with the same name is stored.
    Conflict(StoredLock),
}

/// Persistence for leases.
pub trait LockBackend: Send + Sync {
    /// Insert `data` unless a lease with the same name exists.
    fn insert(&self, data: &LockData) -> EdmsResult<InsertOutcome>;

    fn get(&self, name: &str) -> EdmsResult<Option<StoredLock>>;

    /// Remove the lease `name` only if it is still `lock_id`.
    fn remove_if(&self, name: &str, lock_id: LockId) -> EdmsResult<bool>;

    /// Drop every lease expired at `now`.
    fn purge_expired(&self, now: Timestamp) -> EdmsResult<usize>;
}

fn backend_error(reason: impl ToString) -> LockError {
    LockError::Backend {
        reason: reason.to_string(),
    }
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

/// Process-local leases.
#[derive(Debug, Default)]
pub struct MemoryLockBackend {
    locks: Mutex<HashMap<String, LockData>>,
}

impl MemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> EdmsResult<std::sync::MutexGuard<'_, HashMap<String, LockData>>> {
        self.locks
            .lock()
            .map_err(|_| backend_error("lock table poisoned").into())
    }
}

impl LockBackend for MemoryLockBackend {
    fn insert(&self, data: &LockData) -> EdmsResult<InsertOutcome> {
        let mut locks = self.guard()?;
        if let Some(existing) = locks.get(&data.name) {
            return Ok(InsertOutcome::Conflict(StoredLock {
                data: existing.clone(),
            }));
        }
        locks.insert(data.name.clone(), data.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn get(&self, name: &str) -> EdmsResult<Option<StoredLock>> {
        Ok(self
            .guard()?
            .get(name)
            .cloned()
            .map(|data| StoredLock { data }))
    }

    fn remove_if(&self, name: &str, lock_id: LockId) -> EdmsResult<bool> {
        let mut locks = self.guard()?;
        match locks.get(name) {
            Some(existing) if existing.lock_id == lock_id => {
                locks.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn purge_expired(&self, now: Timestamp) -> EdmsResult<usize> {
        let mut locks = self.guard()?;
        let before = locks.len();
        locks.retain(|_, data| !data.is_expired(now));
        Ok(before - locks.len())
    }
}

// ============================================================================
// FILE BACKEND
// ============================================================================

/// One JSON file per lease, shared between processes through a directory.
///
/// File names are the hex SHA-256 of the lease name with a `.lock` suffix.
/// Creation uses create-new semantics so only one process can win.
#[derive(Debug, Clone)]
pub struct FileLockBackend {
    directory: PathBuf,
}

impl FileLockBackend {
    pub fn new(directory: impl Into<PathBuf>) -> EdmsResult<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| io_reason(&directory, e))?;
        Ok(FileLockBackend { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.directory
            .join(format!("{}.lock", hex_digest(name.as_bytes())))
    }

    fn read(&self, path: &Path) -> EdmsResult<Option<LockData>> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| backend_error(format!("{}: {}", path.display(), e)).into()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_reason(path, e).into()),
        }
    }
}

fn io_reason(path: &Path, error: io::Error) -> LockError {
    backend_error(format!("{}: {}", path.display(), error))
}

impl LockBackend for FileLockBackend {
    fn insert(&self, data: &LockData) -> EdmsResult<InsertOutcome> {
        let path = self.lock_path(&data.name);
        let payload = serde_json::to_vec(data).map_err(backend_error)?;

        // Written aside and linked into place whole, never over another lease.
        let mut pending = tempfile::Builder::new()
            .prefix(".pending-")
            .tempfile_in(&self.directory)
            .map_err(|e| io_reason(&self.directory, e))?;
        pending
            .write_all(&payload)
            .and_then(|_| pending.as_file().sync_all())
            .map_err(|e| io_reason(pending.path(), e))?;

        match pending.persist_noclobber(&path) {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => match self.read(&path)? {
                Some(existing) => Ok(InsertOutcome::Conflict(StoredLock { data: existing })),
                // Released between our attempt and read; report as held so the
                // caller does not race the next holder.
                None => Ok(InsertOutcome::Conflict(StoredLock { data: data.clone() })),
            },
            Err(e) => Err(io_reason(&path, e.error).into()),
        }
    }

    fn get(&self, name: &str) -> EdmsResult<Option<StoredLock>> {
        Ok(self
            .read(&self.lock_path(name))?
            .map(|data| StoredLock { data }))
    }

    fn remove_if(&self, name: &str, lock_id: LockId) -> EdmsResult<bool> {
        let path = self.lock_path(name);
        match self.read(&path)? {
            Some(existing) if existing.lock_id == lock_id => match fs::remove_file(&path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(io_reason(&path, e).into()),
            },
            _ => Ok(false),
        }
    }

    fn purge_expired(&self, now: Timestamp) -> EdmsResult<usize> {
        let entries = fs::read_dir(&self.directory).map_err(|e| io_reason(&self.directory, e))?;
        let mut purged = 0;
        for entry in entries {
            let path = entry.map_err(|e| io_reason(&self.directory, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("lock") {
                continue;
            }
            if let Some(data) = self.read(&path)? {
                if data.is_expired(now) && self.remove_if(&data.name, data.lock_id)? {
                    purged += 1;
                }
            }
        }
        Ok(purged)
    }
}

// ============================================================================
// LOCK MANAGER
// ============================================================================

/// Hands out scoped leases from a backend.
#[derive(Clone)]
pub struct LockManager {
    backend: Arc<dyn LockBackend>,
    default_timeout: Duration,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl LockManager {
    pub fn new(backend: Arc<dyn LockBackend>, default_timeout: Duration) -> Self {
        LockManager {
            backend,
            default_timeout,
        }
    }

    /// Manager over a fresh in-memory backend.
    pub fn in_memory(default_timeout: Duration) -> Self {
        Self::new(Arc::new(MemoryLockBackend::new()), default_timeout)
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn backend(&self) -> &Arc<dyn LockBackend> {
        &self.backend
    }

    pub fn acquire(&self, name: &str) -> EdmsResult<LockGuard> {
        self.acquire_with_timeout(name, self.default_timeout)
    }

    pub fn acquire_with_timeout(&self, name: &str, timeout: Duration) -> EdmsResult<LockGuard> {
        let now = Utc::now();
        let data = LockData::new(name, now, timeout)?;

        let existing = match self.backend.insert(&data)? {
            InsertOutcome::Inserted => return Ok(self.guard(data)),
            InsertOutcome::Conflict(existing) => existing,
        };

        let stale_id = existing.data.lock_id;
        if let Ok(live) = existing.into_acquired(now) {
            debug!(lock = name, expires_at = %live.expires_at(), "lock already held");
            return Err(LockError::AlreadyHeld {
                name: name.to_string(),
                expires_at: live.expires_at(),
            }
            .into());
        }

        warn!(lock = name, lock_id = %stale_id, "forcing release of expired lock");
        self.backend.remove_if(name, stale_id)?;

        match self.backend.insert(&data)? {
            InsertOutcome::Inserted => Ok(self.guard(data)),
            InsertOutcome::Conflict(winner) => Err(LockError::AlreadyHeld {
                name: name.to_string(),
                expires_at: winner.data.expires_at,
            }
            .into()),
        }
    }

    /// True if a live lease named `name` is stored.
    pub fn is_locked(&self, name: &str) -> EdmsResult<bool> {
        let now = Utc::now();
        Ok(self
            .backend
            .get(name)?
            .map(|stored| !stored.data.is_expired(now))
            .unwrap_or(false))
    }

    /// Drop every expired lease.
    pub fn cleanup_expired(&self) -> EdmsResult<usize> {
        let purged = self.backend.purge_expired(Utc::now())?;
        if purged > 0 {
            debug!(purged, "purged expired locks");
        }
        Ok(purged)
    }

    fn guard(&self, data: LockData) -> LockGuard {
        debug!(lock = %data.name, lock_id = %data.lock_id, "lock acquired");
        LockGuard {
            backend: Arc::clone(&self.backend),
            lock: Some(Lock::<Acquired>::new(data)),
        }
    }
}

/// A held lease, released on drop.
pub struct LockGuard {
    backend: Arc<dyn LockBackend>,
    lock: Option<Lock<Acquired>>,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("lock", &self.lock).finish()
    }
}

impl LockGuard {
    pub fn name(&self) -> &str {
        self.lock.as_ref().map(|lock| lock.name()).unwrap_or_default()
    }

    pub fn lock_id(&self) -> Option<LockId> {
        self.lock.as_ref().map(|lock| lock.lock_id())
    }

    pub fn expires_at(&self) -> Option<Timestamp> {
        self.lock.as_ref().map(|lock| lock.expires_at())
    }

    /// Release now. Returns false if the lease had already been taken over.
    pub fn release(mut self) -> EdmsResult<bool> {
        match self.lock.take() {
            Some(lock) => {
                let data = lock.release();
                self.backend.remove_if(&data.name, data.lock_id)
            }
            None => Ok(false),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            let data = lock.release();
            if let Err(e) = self.backend.remove_if(&data.name, data.lock_id) {
                warn!(lock = %data.name, error = %e, "failed to release lock");
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
