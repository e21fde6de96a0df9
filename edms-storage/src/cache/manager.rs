//! Named file caches with byte budgets.

use super::model::{Cache, CachePartition, CachePartitionFile};
use super::stats::{CacheStats, Counters};
use super::store::CacheStore;
use crate::files::{FileStorage, FilesystemStorage};
use crate::locking::LockManager;
use edms_core::{
    CacheDefinition, CacheError, EdmsError, EdmsResult, StorageError,
};
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Name of the lease guarding creation of `filename` in a partition.
pub fn create_file_lock_name(partition: &CachePartition, filename: &str) -> String {
    format!(
        "cache_partition-create_file-{}-{}",
        partition.partition_id, filename
    )
}

/// Re-tag storage I/O failures as cache I/O failures.
fn cache_io(error: EdmsError) -> EdmsError {
    match error {
        EdmsError::Storage(StorageError::Io { path, reason }) => {
            CacheError::Io { path, reason }.into()
        }
        other => other,
    }
}

/// A stored file and where to find it on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub record: CachePartitionFile,
    pub path: PathBuf,
}

// ============================================================================
// FILE CACHE
// ============================================================================

/// One named cache: bookkeeping rows, byte storage and a lock manager.
pub struct FileCache {
    cache: RwLock<Cache>,
    store: Arc<dyn CacheStore>,
    storage: Arc<dyn FileStorage>,
    locks: LockManager,
    counters: Counters,
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("cache", &self.cache)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl FileCache {
    /// Open the cache described by `definition`, creating its row if needed.
    ///
    /// Rows and stored bytes are reconciled first (see [`FileCache::reconcile`]),
    /// then the cache is pruned. A changed `maximum_size` is written back
    /// before the prune.
    pub fn open(
        definition: &CacheDefinition,
        store: Arc<dyn CacheStore>,
        storage: Arc<dyn FileStorage>,
        locks: LockManager,
    ) -> EdmsResult<Self> {
        let cache = match store.cache_get_by_name(&definition.name)? {
            Some(cache) => cache,
            None => {
                let cache = Cache::new(
                    definition.name.clone(),
                    definition.label.clone(),
                    definition.maximum_size,
                );
                store.cache_insert(&cache)?;
                info!(cache = %cache.name, maximum_size = cache.maximum_size, "cache created");
                cache
            }
        };

        let file_cache = FileCache {
            cache: RwLock::new(cache.clone()),
            store,
            storage,
            locks,
            counters: Counters::default(),
        };
        file_cache.reconcile()?;
        if cache.maximum_size != definition.maximum_size || cache.label != definition.label {
            file_cache.update(|c| {
                c.maximum_size = definition.maximum_size;
                c.label = definition.label.clone();
            })?;
        } else {
            file_cache.prune()?;
        }
        Ok(file_cache)
    }

    /// Bring rows and stored bytes back in line, e.g. after a restart.
    ///
    /// Rows whose bytes are gone are dropped, row sizes are corrected from
    /// the stored bytes, and stored names no row points at are deleted.
    /// Returns the number of untracked files deleted.
    pub fn reconcile(&self) -> EdmsResult<usize> {
        let cache = self.snapshot()?;
        let mut tracked = HashSet::new();
        let mut dropped = 0;
        for partition in self.store.partition_list(cache.cache_id)? {
            for mut file in self.store.files_for_partition(partition.partition_id)? {
                let full_filename = partition.full_filename(&file.filename);
                if !self.storage.exists(&full_filename) {
                    self.store.file_delete(file.file_id)?;
                    dropped += 1;
                    continue;
                }
                let size = self.storage.size(&full_filename).map_err(cache_io)?;
                if size != file.file_size {
                    file.file_size = size;
                    self.store.file_update(&file)?;
                }
                tracked.insert(full_filename);
            }
        }

        let mut untracked = 0;
        for name in self.storage.list().map_err(cache_io)? {
            if !tracked.contains(&name) {
                self.storage.delete(&name).map_err(cache_io)?;
                untracked += 1;
            }
        }
        if dropped > 0 || untracked > 0 {
            warn!(cache = %cache.name, dropped, untracked, "cache reconciled with storage");
        }
        Ok(untracked)
    }

    /// Open with byte storage in the definition's directory.
    pub fn from_definition(
        definition: &CacheDefinition,
        store: Arc<dyn CacheStore>,
        locks: LockManager,
    ) -> EdmsResult<Self> {
        let storage = FilesystemStorage::new(&definition.directory).map_err(cache_io)?;
        Self::open(definition, store, Arc::new(storage), locks)
    }

    fn snapshot(&self) -> EdmsResult<Cache> {
        self.cache
            .read()
            .map(|c| c.clone())
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn update<F: FnOnce(&mut Cache)>(&self, change: F) -> EdmsResult<u64> {
        {
            let mut cache = self
                .cache
                .write()
                .map_err(|_| EdmsError::from(StorageError::LockPoisoned))?;
            change(&mut cache);
            self.store.cache_update(&cache)?;
        }
        self.prune()
    }

    pub fn name(&self) -> EdmsResult<String> {
        Ok(self.snapshot()?.name)
    }

    pub fn label(&self) -> EdmsResult<String> {
        Ok(self.snapshot()?.label)
    }

    pub fn maximum_size(&self) -> EdmsResult<u64> {
        Ok(self.snapshot()?.maximum_size)
    }

    /// Change the budget and prune down to it. Returns files evicted.
    pub fn set_maximum_size(&self, maximum_size: u64) -> EdmsResult<u64> {
        self.update(|c| c.maximum_size = maximum_size)
    }

    pub fn total_size(&self) -> EdmsResult<u64> {
        let cache = self.snapshot()?;
        Ok(self
            .store
            .files_for_cache(cache.cache_id)?
            .iter()
            .map(|f| f.file_size)
            .sum())
    }

    /// Delete files oldest-first until the total size fits the budget.
    pub fn prune(&self) -> EdmsResult<u64> {
        let cache = self.snapshot()?;
        let files = self.store.files_for_cache(cache.cache_id)?;
        let mut total: u64 = files.iter().map(|f| f.file_size).sum();
        let mut evicted = 0;

        for file in files {
            if total <= cache.maximum_size {
                break;
            }
            let partition = self
                .store
                .partition_get_by_id(file.partition_id)?
                .ok_or_else(|| CacheError::PartitionNotFound {
                    name: file.partition_id.to_string(),
                })?;
            self.remove_file(&partition, &file)?;
            total = total.saturating_sub(file.file_size);
            evicted += 1;
        }

        if evicted > 0 {
            self.counters.evicted(evicted);
            debug!(cache = %cache.name, evicted, total, "cache pruned");
        }
        Ok(evicted)
    }

    /// Purge every partition. Returns files deleted.
    pub fn purge(&self) -> EdmsResult<usize> {
        let cache = self.snapshot()?;
        let mut deleted = 0;
        for partition in self.store.partition_list(cache.cache_id)? {
            deleted += self.handle(partition).purge()?;
        }
        info!(cache = %cache.name, deleted, "cache purged");
        Ok(deleted)
    }

    /// Get or create the partition `name`.
    pub fn partition(&self, name: &str) -> EdmsResult<PartitionHandle<'_>> {
        let cache = self.snapshot()?;
        if let Some(partition) = self.store.partition_get(cache.cache_id, name)? {
            return Ok(self.handle(partition));
        }
        let partition = CachePartition::new(cache.cache_id, name);
        match self.store.partition_insert(&partition) {
            Ok(()) => Ok(self.handle(partition)),
            Err(EdmsError::Storage(StorageError::AlreadyExists { .. })) => self.get_partition(name),
            Err(e) => Err(e),
        }
    }

    /// Existing partition `name`, or `PartitionNotFound`.
    pub fn get_partition(&self, name: &str) -> EdmsResult<PartitionHandle<'_>> {
        let cache = self.snapshot()?;
        self.store
            .partition_get(cache.cache_id, name)?
            .map(|partition| self.handle(partition))
            .ok_or_else(|| {
                CacheError::PartitionNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Purge the partition `name` and drop its row. Missing partitions are
    /// not an error.
    pub fn delete_partition(&self, name: &str) -> EdmsResult<usize> {
        let cache = self.snapshot()?;
        match self.store.partition_get(cache.cache_id, name)? {
            Some(partition) => {
                let partition_id = partition.partition_id;
                let deleted = self.handle(partition).purge()?;
                self.store.partition_delete(partition_id)?;
                Ok(deleted)
            }
            None => Ok(0),
        }
    }

    pub fn stats(&self) -> EdmsResult<CacheStats> {
        let cache = self.snapshot()?;
        let files = self.store.files_for_cache(cache.cache_id)?;
        let bytes = files.iter().map(|f| f.file_size).sum();
        Ok(self.counters.snapshot(files.len() as u64, bytes))
    }

    fn handle(&self, partition: CachePartition) -> PartitionHandle<'_> {
        PartitionHandle {
            cache: self,
            partition,
        }
    }

    fn remove_file(&self, partition: &CachePartition, file: &CachePartitionFile) -> EdmsResult<()> {
        self.storage
            .delete(&partition.full_filename(&file.filename))
            .map_err(cache_io)?;
        self.store.file_delete(file.file_id)
    }
}

// ============================================================================
// PARTITION HANDLE
// ============================================================================

/// Operations on one partition of a [`FileCache`].
#[derive(Debug)]
pub struct PartitionHandle<'a> {
    cache: &'a FileCache,
    partition: CachePartition,
}

impl<'a> PartitionHandle<'a> {
    pub fn partition(&self) -> &CachePartition {
        &self.partition
    }

    pub fn path(&self, filename: &str) -> PathBuf {
        self.cache
            .storage
            .path(&self.partition.full_filename(filename))
    }

    /// Look up `filename`, counting a hit or a miss.
    ///
    /// A row whose bytes have disappeared is dropped and counted as a miss.
    pub fn get_file(&self, filename: &str) -> EdmsResult<Option<CachedFile>> {
        let record = self.cache.store.file_get(self.partition.partition_id, filename)?;
        let full_filename = self.partition.full_filename(filename);

        match record {
            Some(record) if self.cache.storage.exists(&full_filename) => {
                self.cache.counters.hit();
                debug!(partition = %self.partition.name, filename, "cache hit");
                Ok(Some(CachedFile {
                    record,
                    path: self.cache.storage.path(&full_filename),
                }))
            }
            Some(record) => {
                warn!(
                    partition = %self.partition.name,
                    filename,
                    "cache row without file, dropping"
                );
                self.cache.store.file_delete(record.file_id)?;
                self.cache.counters.miss();
                Ok(None)
            }
            None => {
                self.cache.counters.miss();
                debug!(partition = %self.partition.name, filename, "cache miss");
                Ok(None)
            }
        }
    }

    /// Store the contents of `reader` as `filename`.
    ///
    /// Runs under the partition's create-file lease; a held lease surfaces
    /// as `LockError::AlreadyHeld`. The cache is pruned first. On failure the
    /// partial file and its row are removed.
    pub fn create_file(&self, filename: &str, reader: &mut dyn Read) -> EdmsResult<CachedFile> {
        let _guard = self
            .cache
            .locks
            .acquire(&create_file_lock_name(&self.partition, filename))?;

        if self
            .cache
            .store
            .file_get(self.partition.partition_id, filename)?
            .is_some()
        {
            return Err(CacheError::DuplicateFile {
                partition: self.partition.name.clone(),
                filename: filename.to_string(),
            }
            .into());
        }

        self.cache.prune()?;

        let mut record = CachePartitionFile::new(self.partition.partition_id, filename);
        self.cache.store.file_insert(&record)?;
        let full_filename = self.partition.full_filename(filename);

        let written = self
            .cache
            .storage
            .save(&full_filename, reader)
            .map_err(cache_io)
            .and_then(|size| {
                record.file_size = size;
                self.cache.store.file_update(&record)
            });

        if let Err(e) = written {
            error!(
                partition = %self.partition.name,
                filename,
                error = %e,
                "failed to write cache file"
            );
            if let Err(cleanup) = self.cache.storage.delete(&full_filename) {
                warn!(filename = %full_filename, error = %cleanup, "failed to remove partial cache file");
            }
            if let Err(cleanup) = self.cache.store.file_delete(record.file_id) {
                warn!(filename, error = %cleanup, "failed to remove cache row");
            }
            return Err(e);
        }

        debug!(
            partition = %self.partition.name,
            filename,
            size = record.file_size,
            "cache file created"
        );
        Ok(CachedFile {
            path: self.cache.storage.path(&full_filename),
            record,
        })
    }

    /// Full contents of `filename`.
    pub fn read(&self, filename: &str) -> EdmsResult<Vec<u8>> {
        if self
            .cache
            .store
            .file_get(self.partition.partition_id, filename)?
            .is_none()
        {
            return Err(StorageError::NotFound {
                kind: edms_core::RecordKind::CachePartitionFile,
                id: filename.to_string(),
            }
            .into());
        }
        let full_filename = self.partition.full_filename(filename);
        let mut reader = self.cache.storage.open(&full_filename).map_err(cache_io)?;
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).map_err(|e| CacheError::Io {
            path: full_filename,
            reason: e.to_string(),
        })?;
        Ok(contents)
    }

    /// Delete `filename`. Returns false if it was not recorded.
    pub fn delete_file(&self, filename: &str) -> EdmsResult<bool> {
        match self
            .cache
            .store
            .file_get(self.partition.partition_id, filename)?
        {
            Some(record) => {
                self.cache.remove_file(&self.partition, &record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete every file in the partition. Returns files deleted.
    pub fn purge(&self) -> EdmsResult<usize> {
        let files = self.cache.store.files_for_partition(self.partition.partition_id)?;
        let count = files.len();
        for file in &files {
            self.cache.remove_file(&self.partition, file)?;
        }
        info!(partition = %self.partition.name, files = count, "cache partition purged");
        Ok(count)
    }

    pub fn size(&self) -> EdmsResult<u64> {
        Ok(self
            .cache
            .store
            .files_for_partition(self.partition.partition_id)?
            .iter()
            .map(|f| f.file_size)
            .sum())
    }
}

// ============================================================================
// CACHE SET
// ============================================================================

/// Every configured cache, by name.
#[derive(Debug, Default, Clone)]
pub struct FileCaches {
    caches: BTreeMap<String, Arc<FileCache>>,
}

impl FileCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, cache: Arc<FileCache>) {
        self.caches.insert(name.into(), cache);
    }

    pub fn get(&self, name: &str) -> EdmsResult<Arc<FileCache>> {
        self.caches.get(name).cloned().ok_or_else(|| {
            CacheError::CacheNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.caches.keys().map(String::as_str)
    }

    pub fn purge_all(&self) -> EdmsResult<usize> {
        let mut deleted = 0;
        for cache in self.caches.values() {
            deleted += cache.purge()?;
        }
        Ok(deleted)
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
