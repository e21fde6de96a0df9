//! Lease typestate for named locks.
//!
//! A lease can only be released while it is in the `Acquired` state.
//! Backends persist [`LockData`]; the lock manager hands out typed leases.
//!
//! # State Transition Diagram
//!
//! ```text
//! (unlocked) ─── acquire() ──→ Acquired ─── release() ──→ (unlocked)
//! ```

use crate::{EntityIdType, LockError, LockId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

// ============================================================================
// LOCK DATA (persisted, state-independent)
// ============================================================================

/// Lease record as stored by a lock backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockData {
    pub lock_id: LockId,
    pub name: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl LockData {
    /// Build a fresh lease for `name` starting at `now`.
    ///
    /// Fails when `now + timeout` is not representable.
    pub fn new(
        name: impl Into<String>,
        now: Timestamp,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let name = name.into();
        let expires_at = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|timeout| now.checked_add_signed(timeout))
            .ok_or_else(|| LockError::Backend {
                reason: format!("lock {} timeout of {:?} is out of range", name, timeout),
            })?;
        Ok(LockData {
            lock_id: LockId::now_v7(),
            name,
            acquired_at: now,
            expires_at,
        })
    }

    /// A lease is live while `now < expires_at`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

// ============================================================================
// TYPESTATE MARKERS
// ============================================================================

/// Marker trait for lock states.
pub trait LockState: private::Sealed + Send + Sync {}

/// Lease is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired;
impl LockState for Acquired {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Acquired {}
}

// ============================================================================
// LOCK TYPESTATE WRAPPER
// ============================================================================

/// A lease with compile-time state tracking.
///
/// ```ignore
/// let lock: Lock<Acquired> = Lock::new(LockData::new("job", now, timeout)?);
/// let data = lock.release();
/// ```
#[derive(Debug, Clone)]
pub struct Lock<S: LockState> {
    data: LockData,
    _state: PhantomData<S>,
}

impl<S: LockState> Lock<S> {
    pub fn data(&self) -> &LockData {
        &self.data
    }

    pub fn lock_id(&self) -> LockId {
        self.data.lock_id
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn acquired_at(&self) -> Timestamp {
        self.data.acquired_at
    }

    pub fn expires_at(&self) -> Timestamp {
        self.data.expires_at
    }
}

impl Lock<Acquired> {
    /// Wrap data for a lease that was just inserted.
    pub fn new(data: LockData) -> Self {
        Lock {
            data,
            _state: PhantomData,
        }
    }

    /// Release the lease and return its data.
    pub fn release(self) -> LockData {
        self.data
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.data.is_expired(now)
    }
}

// ============================================================================
// STORAGE BOUNDARY: STORED LOCK
// ============================================================================

/// A lease read back from a backend, state unknown at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLock {
    pub data: LockData,
}

impl StoredLock {
    /// Convert to an acquired lease if it has not expired yet.
    pub fn into_acquired(self, now: Timestamp) -> Result<Lock<Acquired>, LockStateError> {
        if self.data.is_expired(now) {
            return Err(LockStateError::Expired {
                lock_id: self.data.lock_id,
                expired_at: self.data.expires_at,
            });
        }
        Ok(Lock::new(self.data))
    }

    pub fn data(&self) -> &LockData {
        &self.data
    }
}

/// Errors when transitioning lease states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStateError {
    Expired {
        lock_id: LockId,
        expired_at: Timestamp,
    },
}

impl fmt::Display for LockStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockStateError::Expired {
                lock_id,
                expired_at,
            } => write!(f, "Lock {} expired at {}", lock_id, expired_at),
        }
    }
}

impl std::error::Error for LockStateError {}
