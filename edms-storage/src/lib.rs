//! EDMS Storage - Storage Traits and In-Memory Implementations
//!
//! Access-record storage, byte storage for cached files, lease backends with
//! the lock manager, and the file cache built on top of them.

pub mod access;
pub mod cache;
pub mod files;
pub mod locking;

pub use access::{AccessStorage, MemoryAccessStorage};
pub use cache::{
    cache_filename, cache_path, create_file_lock_name, Cache, CachePartition, CachePartitionFile,
    CacheStats, CacheStore, CachedFile, FileCache, FileCaches, JsonCacheStore, MemoryCacheStore,
    PartitionHandle, INDEX_FILENAME,
};
pub use files::{FileStorage, FilesystemStorage};
pub use locking::{
    FileLockBackend, InsertOutcome, LockBackend, LockGuard, LockManager, MemoryLockBackend,
};

use edms_core::{EdmsResult, StorageError};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Read a table, mapping poisoning to `StorageError::LockPoisoned`.
pub(crate) fn read_guard<T>(lock: &RwLock<T>) -> EdmsResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StorageError::LockPoisoned.into())
}

/// Write a table, mapping poisoning to `StorageError::LockPoisoned`.
pub(crate) fn write_guard<T>(lock: &RwLock<T>) -> EdmsResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StorageError::LockPoisoned.into())
}
