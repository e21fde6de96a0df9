//! File cache: named caches with byte budgets, partitions and bookkeeping.
//!
//! Rendered artifacts are stored under deterministic names (see [`key`]).
//! Each cache keeps one row per stored file so it can prune oldest-first
//! once the total size exceeds its `maximum_size`, and purge whole
//! partitions when their source goes away. [`JsonCacheStore`] keeps the rows
//! across restarts; on open, stored bytes without a row are deleted.
//!
//! # Example
//!
//! ```ignore
//! let cache = FileCache::from_definition(&definition, store, locks)?;
//! let partition = cache.partition(&document_id.to_string())?;
//! match partition.get_file(&key)? {
//!     Some(hit) => hit.path,
//!     None => partition.create_file(&key, &mut rendered)?.path,
//! }
//! ```

pub mod key;
pub mod manager;
pub mod model;
pub mod stats;
pub mod store;

pub use key::{cache_filename, cache_path};
pub use manager::{create_file_lock_name, CachedFile, FileCache, FileCaches, PartitionHandle};
pub use model::{Cache, CachePartition, CachePartitionFile};
pub use stats::CacheStats;
pub use store::{CacheStore, JsonCacheStore, MemoryCacheStore, INDEX_FILENAME};
