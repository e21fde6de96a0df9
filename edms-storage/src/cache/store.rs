//! Bookkeeping storage for caches, partitions and files.

use super::model::{Cache, CachePartition, CachePartitionFile};
use crate::files::io_error;
use crate::{read_guard, write_guard};
use edms_core::{CacheId, EdmsError, EdmsResult, PartitionFileId, PartitionId, RecordKind, StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// Rows behind the file cache.
pub trait CacheStore: Send + Sync {
    // === Caches ===

    /// Insert a cache; names are unique.
    fn cache_insert(&self, cache: &Cache) -> EdmsResult<()>;
    fn cache_get_by_name(&self, name: &str) -> EdmsResult<Option<Cache>>;
    fn cache_update(&self, cache: &Cache) -> EdmsResult<()>;

    // === Partitions ===

    /// Insert a partition; `(cache, name)` is unique.
    fn partition_insert(&self, partition: &CachePartition) -> EdmsResult<()>;
    fn partition_get(&self, cache_id: CacheId, name: &str) -> EdmsResult<Option<CachePartition>>;
    fn partition_get_by_id(&self, id: PartitionId) -> EdmsResult<Option<CachePartition>>;
    fn partition_list(&self, cache_id: CacheId) -> EdmsResult<Vec<CachePartition>>;
    fn partition_delete(&self, id: PartitionId) -> EdmsResult<()>;

    // === Files ===

    /// Insert a file row; `(partition, filename)` is unique.
    fn file_insert(&self, file: &CachePartitionFile) -> EdmsResult<()>;
    fn file_get(&self, partition_id: PartitionId, filename: &str)
        -> EdmsResult<Option<CachePartitionFile>>;
    fn file_update(&self, file: &CachePartitionFile) -> EdmsResult<()>;
    fn file_delete(&self, id: PartitionFileId) -> EdmsResult<()>;
    fn files_for_partition(&self, partition_id: PartitionId)
        -> EdmsResult<Vec<CachePartitionFile>>;
    /// Every file of every partition of the cache, oldest first.
    fn files_for_cache(&self, cache_id: CacheId) -> EdmsResult<Vec<CachePartitionFile>>;
}

/// In-memory bookkeeping. Files keep insertion order so equal timestamps
/// still sort oldest-first.
#[derive(Debug, Default, Clone)]
pub struct MemoryCacheStore {
    caches: Arc<RwLock<Vec<Cache>>>,
    partitions: Arc<RwLock<Vec<CachePartition>>>,
    files: Arc<RwLock<Vec<CachePartitionFile>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(kind: RecordKind, id: impl ToString) -> StorageError {
    StorageError::NotFound {
        kind,
        id: id.to_string(),
    }
}

impl CacheStore for MemoryCacheStore {
    fn cache_insert(&self, cache: &Cache) -> EdmsResult<()> {
        let mut caches = write_guard(&self.caches)?;
        if caches.iter().any(|c| c.name == cache.name) {
            return Err(StorageError::AlreadyExists {
                kind: RecordKind::Cache,
                key: cache.name.clone(),
            }
            .into());
        }
        caches.push(cache.clone());
        Ok(())
    }

    fn cache_get_by_name(&self, name: &str) -> EdmsResult<Option<Cache>> {
        Ok(read_guard(&self.caches)?
            .iter()
            .find(|c| c.name == name)
            .cloned())
    }

    fn cache_update(&self, cache: &Cache) -> EdmsResult<()> {
        let mut caches = write_guard(&self.caches)?;
        let existing = caches
            .iter_mut()
            .find(|c| c.cache_id == cache.cache_id)
            .ok_or_else(|| not_found(RecordKind::Cache, cache.cache_id))?;
        *existing = cache.clone();
        Ok(())
    }

    fn partition_insert(&self, partition: &CachePartition) -> EdmsResult<()> {
        let mut partitions = write_guard(&self.partitions)?;
        if partitions
            .iter()
            .any(|p| p.cache_id == partition.cache_id && p.name == partition.name)
        {
            return Err(StorageError::AlreadyExists {
                kind: RecordKind::CachePartition,
                key: partition.name.clone(),
            }
            .into());
        }
        partitions.push(partition.clone());
        Ok(())
    }

    fn partition_get(&self, cache_id: CacheId, name: &str) -> EdmsResult<Option<CachePartition>> {
        Ok(read_guard(&self.partitions)?
            .iter()
            .find(|p| p.cache_id == cache_id && p.name == name)
            .cloned())
    }

    fn partition_get_by_id(&self, id: PartitionId) -> EdmsResult<Option<CachePartition>> {
        Ok(read_guard(&self.partitions)?
            .iter()
            .find(|p| p.partition_id == id)
            .cloned())
    }

    fn partition_list(&self, cache_id: CacheId) -> EdmsResult<Vec<CachePartition>> {
        Ok(read_guard(&self.partitions)?
            .iter()
            .filter(|p| p.cache_id == cache_id)
            .cloned()
            .collect())
    }

    fn partition_delete(&self, id: PartitionId) -> EdmsResult<()> {
        let mut partitions = write_guard(&self.partitions)?;
        let before = partitions.len();
        partitions.retain(|p| p.partition_id != id);
        if partitions.len() == before {
            return Err(not_found(RecordKind::CachePartition, id).into());
        }
        write_guard(&self.files)?.retain(|f| f.partition_id != id);
        Ok(())
    }

    fn file_insert(&self, file: &CachePartitionFile) -> EdmsResult<()> {
        let mut files = write_guard(&self.files)?;
        if files
            .iter()
            .any(|f| f.partition_id == file.partition_id && f.filename == file.filename)
        {
            return Err(StorageError::AlreadyExists {
                kind: RecordKind::CachePartitionFile,
                key: file.filename.clone(),
            }
            .into());
        }
        files.push(file.clone());
        Ok(())
    }

    fn file_get(
        &self,
        partition_id: PartitionId,
        filename: &str,
    ) -> EdmsResult<Option<CachePartitionFile>> {
        Ok(read_guard(&self.files)?
            .iter()
            .find(|f| f.partition_id == partition_id && f.filename == filename)
            .cloned())
    }

    fn file_update(&self, file: &CachePartitionFile) -> EdmsResult<()> {
        let mut files = write_guard(&self.files)?;
        let existing = files
            .iter_mut()
            .find(|f| f.file_id == file.file_id)
            .ok_or_else(|| not_found(RecordKind::CachePartitionFile, file.file_id))?;
        *existing = file.clone();
        Ok(())
    }

    fn file_delete(&self, id: PartitionFileId) -> EdmsResult<()> {
        let mut files = write_guard(&self.files)?;
        let before = files.len();
        files.retain(|f| f.file_id != id);
        if files.len() == before {
            return Err(not_found(RecordKind::CachePartitionFile, id).into());
        }
        Ok(())
    }

    fn files_for_partition(&self, partition_id: PartitionId) -> EdmsResult<Vec<CachePartitionFile>> {
        Ok(read_guard(&self.files)?
            .iter()
            .filter(|f| f.partition_id == partition_id)
            .cloned()
            .collect())
    }

    fn files_for_cache(&self, cache_id: CacheId) -> EdmsResult<Vec<CachePartitionFile>> {
        let partitions: Vec<PartitionId> = read_guard(&self.partitions)?
            .iter()
            .filter(|p| p.cache_id == cache_id)
            .map(|p| p.partition_id)
            .collect();
        let mut files: Vec<CachePartitionFile> = read_guard(&self.files)?
            .iter()
            .filter(|f| partitions.contains(&f.partition_id))
            .cloned()
            .collect();
        files.sort_by_key(|f| f.datetime);
        Ok(files)
    }
}

// ============================================================================
// JSON INDEX
// ============================================================================

/// File name of the index kept beside cached bytes.
pub const INDEX_FILENAME: &str = ".edms-cache-index.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheIndex {
    caches: Vec<Cache>,
    partitions: Vec<CachePartition>,
    files: Vec<CachePartitionFile>,
}

/// Bookkeeping that survives restarts: the in-memory tables, rewritten to a
/// JSON index file after every change.
///
/// The index is replaced atomically (temp file then rename), so a crash
/// leaves either the old or the new index in place. One process owns an
/// index at a time.
#[derive(Debug)]
pub struct JsonCacheStore {
    path: PathBuf,
    tables: MemoryCacheStore,
    flush: Mutex<()>,
}

impl JsonCacheStore {
    /// Load the index at `path`, or start empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> EdmsResult<Self> {
        let path = path.into();
        let index: CacheIndex = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StorageError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => CacheIndex::default(),
            Err(e) => return Err(io_error(&path, e).into()),
        };
        debug!(
            index = %path.display(),
            caches = index.caches.len(),
            files = index.files.len(),
            "cache index loaded"
        );
        Ok(JsonCacheStore {
            path,
            tables: MemoryCacheStore {
                caches: Arc::new(RwLock::new(index.caches)),
                partitions: Arc::new(RwLock::new(index.partitions)),
                files: Arc::new(RwLock::new(index.files)),
            },
            flush: Mutex::new(()),
        })
    }

    /// Index kept in `directory` under [`INDEX_FILENAME`].
    pub fn in_directory(directory: &Path) -> EdmsResult<Self> {
        fs::create_dir_all(directory).map_err(|e| io_error(directory, e))?;
        Self::open(directory.join(INDEX_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> EdmsResult<()> {
        let _flush = self
            .flush
            .lock()
            .map_err(|_| EdmsError::from(StorageError::LockPoisoned))?;
        let index = CacheIndex {
            caches: read_guard(&self.tables.caches)?.clone(),
            partitions: read_guard(&self.tables.partitions)?.clone(),
            files: read_guard(&self.tables.files)?.clone(),
        };
        let payload = serde_json::to_vec_pretty(&index).map_err(|e| StorageError::Io {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        let directory = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut scratch =
            tempfile::NamedTempFile::new_in(directory).map_err(|e| io_error(directory, e))?;
        scratch
            .write_all(&payload)
            .and_then(|_| scratch.as_file().sync_all())
            .map_err(|e| io_error(scratch.path(), e))?;
        scratch
            .persist(&self.path)
            .map_err(|e| io_error(&self.path, e.error))?;
        Ok(())
    }
}

impl CacheStore for JsonCacheStore {
    fn cache_insert(&self, cache: &Cache) -> EdmsResult<()> {
        self.tables.cache_insert(cache)?;
        self.persist()
    }

    fn cache_get_by_name(&self, name: &str) -> EdmsResult<Option<Cache>> {
        self.tables.cache_get_by_name(name)
    }

    fn cache_update(&self, cache: &Cache) -> EdmsResult<()> {
        self.tables.cache_update(cache)?;
        self.persist()
    }

    fn partition_insert(&self, partition: &CachePartition) -> EdmsResult<()> {
        self.tables.partition_insert(partition)?;
        self.persist()
    }

    fn partition_get(&self, cache_id: CacheId, name: &str) -> EdmsResult<Option<CachePartition>> {
        self.tables.partition_get(cache_id, name)
    }

    fn partition_get_by_id(&self, id: PartitionId) -> EdmsResult<Option<CachePartition>> {
        self.tables.partition_get_by_id(id)
    }

    fn partition_list(&self, cache_id: CacheId) -> EdmsResult<Vec<CachePartition>> {
        self.tables.partition_list(cache_id)
    }

    fn partition_delete(&self, id: PartitionId) -> EdmsResult<()> {
        self.tables.partition_delete(id)?;
        self.persist()
    }

    fn file_insert(&self, file: &CachePartitionFile) -> EdmsResult<()> {
        self.tables.file_insert(file)?;
        self.persist()
    }

    fn file_get(
        &self,
        partition_id: PartitionId,
        filename: &str,
    ) -> EdmsResult<Option<CachePartitionFile>> {
        self.tables.file_get(partition_id, filename)
    }

    fn file_update(&self, file: &CachePartitionFile) -> EdmsResult<()> {
        self.tables.file_update(file)?;
        self.persist()
    }

    fn file_delete(&self, id: PartitionFileId) -> EdmsResult<()> {
        self.tables.file_delete(id)?;
        self.persist()
    }

    fn files_for_partition(&self, partition_id: PartitionId) -> EdmsResult<Vec<CachePartitionFile>> {
        self.tables.files_for_partition(partition_id)
    }

    fn files_for_cache(&self, cache_id: CacheId) -> EdmsResult<Vec<CachePartitionFile>> {
        self.tables.files_for_cache(cache_id)
    }
}
