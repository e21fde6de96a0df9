//! Cache bookkeeping records.

use edms_core::{CacheId, EntityIdType, PartitionFileId, PartitionId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A named cache with a byte budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {
    pub cache_id: CacheId,
    pub name: String,
    pub label: String,
    pub maximum_size: u64,
}

impl Cache {
    pub fn new(name: impl Into<String>, label: impl Into<String>, maximum_size: u64) -> Self {
        Cache {
            cache_id: CacheId::now_v7(),
            name: name.into(),
            label: label.into(),
            maximum_size,
        }
    }
}

/// Named subdivision of a cache, usually one per source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePartition {
    pub partition_id: PartitionId,
    pub cache_id: CacheId,
    pub name: String,
}

impl CachePartition {
    pub fn new(cache_id: CacheId, name: impl Into<String>) -> Self {
        CachePartition {
            partition_id: PartitionId::now_v7(),
            cache_id,
            name: name.into(),
        }
    }

    /// Stored name of `filename` within this partition.
    ///
    /// The partition name is length-prefixed so `("a-b", "c")` and
    /// `("a", "b-c")` map to different names.
    pub fn full_filename(&self, filename: &str) -> String {
        format!("{}-{}-{}", self.name.len(), self.name, filename)
    }
}

/// One stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePartitionFile {
    pub file_id: PartitionFileId,
    pub partition_id: PartitionId,
    pub filename: String,
    pub file_size: u64,
    pub datetime: Timestamp,
}

impl CachePartitionFile {
    pub fn new(partition_id: PartitionId, filename: impl Into<String>) -> Self {
        CachePartitionFile {
            file_id: PartitionFileId::now_v7(),
            partition_id,
            filename: filename.into(),
            file_size: 0,
            datetime: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_filename() {
        let cache = Cache::new("document_page_images", "Document page images", 1024);
        let partition = CachePartition::new(cache.cache_id, "0190c2b0-doc");
        assert_eq!(partition.full_filename("abc123"), "12-0190c2b0-doc-abc123");
    }

    #[test]
    fn test_full_filename_separates_dashed_names() {
        let cache_id = CacheId::now_v7();
        let dashed_partition = CachePartition::new(cache_id, "a-b");
        let plain_partition = CachePartition::new(cache_id, "a");
        assert_ne!(
            dashed_partition.full_filename("c"),
            plain_partition.full_filename("b-c")
        );
    }

    #[test]
    fn test_new_file_starts_empty() {
        let file = CachePartitionFile::new(PartitionId::now_v7(), "abc");
        assert_eq!(file.file_size, 0);
        assert_eq!(file.filename, "abc");
    }
}
