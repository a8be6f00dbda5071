//! Storage backends for persisted manifests.
//!
//! A plain directory is the reference backend: one self-describing record
//! per file under `<dir>/manifests/<hash>.bin`, scanned at startup.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use weft_common::CommonError;

/// Minimal persistence contract for manifest records.
pub trait ManifestStore: Send + Sync {
    /// Read every stored record.
    fn read_all(&self) -> Result<Vec<Vec<u8>>, CommonError>;

    /// Write (or overwrite) the record stored under `key`.
    fn write(&self, key: &str, record: &[u8]) -> Result<(), CommonError>;

    /// Remove the record stored under `key`; absent keys are not an error.
    fn delete(&self, key: &str) -> Result<(), CommonError>;
}

/// Directory-backed manifest store.
#[derive(Debug)]
pub struct DirManifestStore {
    dir: PathBuf,
}

impl DirManifestStore {
    /// Open (creating if needed) the manifest directory under `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self, CommonError> {
        let dir = cache_dir.into().join("manifests");
        fs::create_dir_all(&dir)
            .map_err(|e| CommonError::IoError(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }
}

impl ManifestStore for DirManifestStore {
    fn read_all(&self) -> Result<Vec<Vec<u8>>, CommonError> {
        let mut records = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| CommonError::IoError(format!("scan {}: {e}", self.dir.display())))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| CommonError::IoError(format!("scan entry: {e}")))?;
            let path = entry.path();
            if path.extension().map(|ext| ext == "bin").unwrap_or(false) {
                let record = fs::read(&path)
                    .map_err(|e| CommonError::IoError(format!("read {}: {e}", path.display())))?;
                records.push(record);
            }
        }
        Ok(records)
    }

    fn write(&self, key: &str, record: &[u8]) -> Result<(), CommonError> {
        let path = self.path_for(key);
        fs::write(&path, record)
            .map_err(|e| CommonError::IoError(format!("write {}: {e}", path.display())))
    }

    fn delete(&self, key: &str) -> Result<(), CommonError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CommonError::IoError(format!(
                "delete {}: {e}",
                path.display()
            ))),
        }
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct InMemoryManifestStore {
    records: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ManifestStore for InMemoryManifestStore {
    fn read_all(&self) -> Result<Vec<Vec<u8>>, CommonError> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    fn write(&self, key: &str, record: &[u8]) -> Result<(), CommonError> {
        self.records
            .lock()
            .unwrap()
            .insert(key.to_string(), record.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CommonError> {
        self.records.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_store_round_trips_records() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirManifestStore::new(tmp.path()).unwrap();

        store.write("aa11", b"record-one").unwrap();
        store.write("bb22", b"record-two").unwrap();

        let mut records = store.read_all().unwrap();
        records.sort();
        assert_eq!(records, vec![b"record-one".to_vec(), b"record-two".to_vec()]);

        store.delete("aa11").unwrap();
        assert_eq!(store.read_all().unwrap().len(), 1);
        // Deleting a missing key is fine.
        store.delete("aa11").unwrap();
    }

    #[test]
    fn dir_store_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = DirManifestStore::new(tmp.path()).unwrap();
            store.write("cc33", b"persisted").unwrap();
        }
        let store = DirManifestStore::new(tmp.path()).unwrap();
        assert_eq!(store.read_all().unwrap(), vec![b"persisted".to_vec()]);
    }
}
