//! Byte storage for cached artifacts.

use edms_core::{EdmsResult, RecordKind, StorageError};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Where a cache keeps file contents. Names are flat, no separators.
pub trait FileStorage: Send + Sync {
    /// Write everything from `reader` under `name`, returning the byte count.
    fn save(&self, name: &str, reader: &mut dyn Read) -> EdmsResult<u64>;

    fn open(&self, name: &str) -> EdmsResult<Box<dyn Read + Send>>;

    fn exists(&self, name: &str) -> bool;

    /// Remove `name`. Missing files are not an error.
    fn delete(&self, name: &str) -> EdmsResult<()>;

    fn size(&self, name: &str) -> EdmsResult<u64>;

    /// Local path of `name`, for handing to external tools.
    fn path(&self, name: &str) -> PathBuf;

    /// Every stored name. Hidden names (leading `.`) are not listed.
    fn list(&self) -> EdmsResult<Vec<String>>;
}

/// Files under a single directory.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    /// Open (and create if needed) the directory `root`.
    pub fn new(root: impl Into<PathBuf>) -> EdmsResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_error(&root, e))?;
        Ok(FilesystemStorage { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

pub(crate) fn io_error(path: &Path, error: io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        reason: error.to_string(),
    }
}

impl FileStorage for FilesystemStorage {
    fn save(&self, name: &str, reader: &mut dyn Read) -> EdmsResult<u64> {
        let path = self.path(name);
        let mut file = File::create(&path).map_err(|e| io_error(&path, e))?;
        let written = io::copy(reader, &mut file).map_err(|e| io_error(&path, e))?;
        file.sync_all().map_err(|e| io_error(&path, e))?;
        Ok(written)
    }

    fn open(&self, name: &str) -> EdmsResult<Box<dyn Read + Send>> {
        let path = self.path(name);
        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound {
                kind: RecordKind::File,
                id: name.to_string(),
            }
            .into()),
            Err(e) => Err(io_error(&path, e).into()),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn delete(&self, name: &str) -> EdmsResult<()> {
        let path = self.path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e).into()),
        }
    }

    fn size(&self, name: &str) -> EdmsResult<u64> {
        let path = self.path(name);
        let metadata = fs::metadata(&path).map_err(|e| io_error(&path, e))?;
        Ok(metadata.len())
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn list(&self) -> EdmsResult<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| io_error(&self.root, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&self.root, e))?;
            let is_file = entry
                .file_type()
                .map_err(|e| io_error(&entry.path(), e))?
                .is_file();
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_file && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edms_core::EdmsError;

    #[test]
    fn test_save_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("pages")).unwrap();

        let written = storage.save("page-1", &mut &b"rendered"[..]).unwrap();
        assert_eq!(written, 8);
        assert!(storage.exists("page-1"));
        assert_eq!(storage.size("page-1").unwrap(), 8);

        let mut contents = String::new();
        storage
            .open("page-1")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "rendered");
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path()).unwrap();
        assert!(matches!(
            storage.open("nope"),
            Err(EdmsError::Storage(StorageError::NotFound {
                kind: RecordKind::File,
                ..
            }))
        ));
    }

    #[test]
    fn test_list_skips_hidden_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path()).unwrap();
        storage.save("b", &mut &b"1"[..]).unwrap();
        storage.save("a", &mut &b"2"[..]).unwrap();
        fs::write(dir.path().join(".index.json"), b"{}").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        assert_eq!(storage.list().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path()).unwrap();
        storage.save("x", &mut &b"1"[..]).unwrap();
        storage.delete("x").unwrap();
        storage.delete("x").unwrap();
        assert!(!storage.exists("x"));
    }
}
