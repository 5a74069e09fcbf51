//! File-backed storage: write to a temp file in the same directory, fsync,
//! then atomically rename over the previous snapshot.
//!
//! No module in rishy2211-mlsnitch does this directly (rishy2211-mlsnitch only ever persists to
//! RocksDB), but the pattern is the standard crash-safe file write idiom and
//! is grounded on `tempfile`, already a dev-dependency there used the same
//! way (throwaway-but-real filesystem paths) in its RocksDB store tests.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{check_snapshot_version, Snapshot, Storage, StorageError, StorageHealth};

/// A `Storage` backend that persists the snapshot as a single JSON file,
/// replaced atomically on every save.
pub struct FileStorage {
    path: PathBuf,
    // Serializes writers; `save` still only ever touches the filesystem
    // through temp-file-then-rename, but two concurrent `save` calls must
    // not race on choosing a temp file name.
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut p = self.path.clone();
        let file_name = format!(
            ".{}.tmp",
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("snapshot")
        );
        p.set_file_name(file_name);
        p
    }
}

impl Storage for FileStorage {
    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)
            .map_err(|e| StorageError::Unavailable(format!("reading {}: {e}", self.path.display())))?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Corrupt(format!("{}: {e}", self.path.display())))?;
        check_snapshot_version(&snapshot)?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Write("write lock poisoned".to_string()))?;

        let tmp = self.temp_path();
        let bytes = serde_json::to_vec(snapshot)
            .map_err(|e| StorageError::Write(format!("serializing snapshot: {e}")))?;

        let mut file = File::create(&tmp)
            .map_err(|e| StorageError::Write(format!("creating {}: {e}", tmp.display())))?;
        file.write_all(&bytes)
            .map_err(|e| StorageError::Write(format!("writing {}: {e}", tmp.display())))?;
        file.sync_all()
            .map_err(|e| StorageError::Write(format!("fsync {}: {e}", tmp.display())))?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .map_err(|e| StorageError::Write(format!("renaming into {}: {e}", self.path.display())))?;

        if let Some(dir) = self.path.parent() {
            if let Ok(dir_file) = File::open(dir) {
                let _ = dir_file.sync_all();
            }
        }
        Ok(())
    }

    fn health(&self) -> StorageHealth {
        let available = matches!(self.path.parent().map(Path::exists), Some(true) | None);
        StorageHealth {
            available,
            read_only: false,
            backend_name: "file".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_on_empty_path_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::new(dir.path().join("snapshot.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_roundtrips_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = FileStorage::new(&path);
        store.save(&Snapshot::default()).unwrap();
        assert!(store.load().unwrap().is_some());
        assert!(path.exists());
        assert!(!dir.path().join(".snapshot.json.tmp").exists());
    }

    #[test]
    fn second_save_overwrites_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::new(dir.path().join("snapshot.json"));
        store.save(&Snapshot::default()).unwrap();
        store.save(&Snapshot::default()).unwrap();
        assert!(store.load().unwrap().is_some());
    }
}
