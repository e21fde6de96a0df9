//! Converter backed by a file cache.
//!
//! A rendition is keyed by its input path plus page, format, quality and the
//! combined transformation hash. A hit returns the stored file without
//! touching the backend; a miss converts into a scratch directory and moves
//! the result into the cache. Failed conversions leave nothing behind.

use crate::backend::ConversionRequest;
use crate::converter::Converter;
use crate::transformation::Transformation;
use edms_core::{CacheError, EdmsError, EdmsResult};
use edms_storage::{cache_filename, FileCache};
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CachedConverter {
    converter: Arc<Converter>,
    cache: Arc<FileCache>,
}

impl CachedConverter {
    pub fn new(converter: Arc<Converter>, cache: Arc<FileCache>) -> Self {
        CachedConverter { converter, cache }
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    /// File name the rendition of `request` is stored under.
    pub fn cache_key(request: &ConversionRequest) -> String {
        let no_args: [&str; 0] = [];
        let kwargs = [
            ("page", request.page.to_string()),
            ("format", request.file_format.to_lowercase()),
            ("quality", request.quality.as_db_str().to_string()),
            (
                "transformations",
                Transformation::combine(&request.transformations),
            ),
        ];
        cache_filename(&request.input.display().to_string(), &no_args, &kwargs)
    }

    /// Path of the rendition of `request` in `partition`, converting on a miss.
    pub fn convert(
        &self,
        partition: &str,
        request: &ConversionRequest,
        mime_type: Option<&str>,
    ) -> EdmsResult<PathBuf> {
        let key = Self::cache_key(request);
        let handle = self.cache.partition(partition)?;
        if let Some(cached) = handle.get_file(&key)? {
            return Ok(cached.path);
        }

        let scratch = tempfile::Builder::new()
            .prefix("render-")
            .tempdir_in(self.scratch_root()?)
            .map_err(|e| io_error(&self.converter.temporary_directory().display().to_string(), e))?;
        let output = scratch.path().join(&key);
        self.converter.convert(request, &output, mime_type)?;

        let mut file = File::open(&output).map_err(|e| io_error(&output.display().to_string(), e))?;
        let cached = match handle.create_file(&key, &mut file) {
            Ok(cached) => cached,
            // Another caller stored the same rendition first.
            Err(EdmsError::Cache(CacheError::DuplicateFile { .. })) => {
                match handle.get_file(&key)? {
                    Some(existing) => {
                        debug!(partition, input = %request.input.display(), "rendition stored concurrently");
                        return Ok(existing.path);
                    }
                    None => {
                        return Err(CacheError::DuplicateFile {
                            partition: partition.to_string(),
                            filename: key,
                        }
                        .into())
                    }
                }
            }
            Err(e) => return Err(e),
        };
        debug!(
            partition,
            input = %request.input.display(),
            size = cached.record.file_size,
            "rendition cached"
        );
        Ok(cached.path)
    }

    /// Drop every rendition of a deleted document.
    pub fn forget_document(&self, partition: &str) -> EdmsResult<usize> {
        self.cache.delete_partition(partition)
    }

    fn scratch_root(&self) -> EdmsResult<PathBuf> {
        let root = self.converter.temporary_directory().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| io_error(&root.display().to_string(), e))?;
        Ok(root)
    }
}

fn io_error(path: &str, error: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.to_string(),
        reason: error.to_string(),
    }
}
