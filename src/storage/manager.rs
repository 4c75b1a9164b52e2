//! Storage manager: the registry of open tablespaces for one data
//! directory (spec §4.1, the layer above individual containers).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::{Result, StorageError};
use crate::storage::tablespace::{container_path, Tablespace};

pub struct StorageManager {
    data_dir: PathBuf,
    page_size: usize,
    tablespaces: RwLock<HashMap<String, Arc<Tablespace>>>,
}

impl StorageManager {
    pub fn new(data_dir: PathBuf, page_size: usize) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            page_size,
            tablespaces: RwLock::new(HashMap::new()),
        })
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Create a brand-new tablespace. Errors if one is already registered
    /// under this name, or if a container file already exists on disk for
    /// it (use [`Self::open_tablespace`] to attach to an existing one).
    pub fn create_tablespace(&self, name: &str, initial_pages: u32) -> Result<Arc<Tablespace>> {
        {
            let guard = self.tablespaces.read();
            if guard.contains_key(name) {
                return Err(StorageError::AlreadyExists(format!("tablespace {name}")));
            }
        }
        if container_path(&self.data_dir, name).exists() {
            return Err(StorageError::AlreadyExists(format!(
                "container file for tablespace {name} already exists on disk"
            )));
        }
        info!(tablespace = name, "creating tablespace");
        let ts = Arc::new(Tablespace::open(&self.data_dir, name, self.page_size, 4)?);
        self.tablespaces.write().insert(name.to_string(), ts.clone());
        Ok(ts)
    }

    /// Attach to a tablespace's container file, creating it if this is
    /// genuinely the first time it's been seen. Used both for normal
    /// startup and for catalog bootstrap reattaching to tablespaces found
    /// on disk but not yet named in the registry.
    pub fn open_tablespace(&self, name: &str) -> Result<Arc<Tablespace>> {
        if let Some(ts) = self.tablespaces.read().get(name) {
            return Ok(ts.clone());
        }
        let ts = Arc::new(Tablespace::open(&self.data_dir, name, self.page_size, 4)?);
        self.tablespaces.write().insert(name.to_string(), ts.clone());
        Ok(ts)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tablespace>> {
        self.tablespaces.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tablespaces.read().keys().cloned().collect()
    }

    /// Tablespace container files present in the data directory, whether or
    /// not they are currently registered. Catalog bootstrap uses this to
    /// find tablespaces the in-memory registry doesn't know about yet.
    pub fn discover_on_disk(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if !self.data_dir.exists() {
            return Ok(names);
        }
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("rsc") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Best-effort close of every registered tablespace. Returns one entry
    /// per tablespace that failed to flush cleanly; never fails fast so a
    /// bad container doesn't block the others from closing.
    pub fn close_all(&self) -> Vec<(String, StorageError)> {
        let guard = self.tablespaces.read();
        let mut errors = Vec::new();
        for (name, ts) in guard.iter() {
            if let Err(e) = ts.close() {
                errors.push((name.clone(), e));
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let mgr = StorageManager::new(dir.path().to_path_buf(), 4096).unwrap();
        mgr.create_tablespace("widgets", 4).unwrap();
        assert!(mgr.get("widgets").is_some());
        assert_eq!(mgr.names(), vec!["widgets".to_string()]);
    }

    #[test]
    fn create_twice_is_an_error() {
        let dir = tempdir().unwrap();
        let mgr = StorageManager::new(dir.path().to_path_buf(), 4096).unwrap();
        mgr.create_tablespace("widgets", 4).unwrap();
        assert!(mgr.create_tablespace("widgets", 4).is_err());
    }

    #[test]
    fn discover_on_disk_finds_unregistered_containers() {
        let dir = tempdir().unwrap();
        {
            let mgr = StorageManager::new(dir.path().to_path_buf(), 4096).unwrap();
            mgr.create_tablespace("widgets", 4).unwrap();
        }
        let mgr = StorageManager::new(dir.path().to_path_buf(), 4096).unwrap();
        assert_eq!(mgr.discover_on_disk().unwrap(), vec!["widgets".to_string()]);
        assert!(mgr.get("widgets").is_none());
        mgr.open_tablespace("widgets").unwrap();
        assert!(mgr.get("widgets").is_some());
    }
}
