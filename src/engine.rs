//! Top-level engine facade: one [`DatabaseSystem`] per data directory,
//! wiring together the storage manager, one buffer pool per open
//! tablespace, and the catalog (spec §2 "Subsystems", §4.4).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::buffer::{BufferPoolManager, Cleaner};
use crate::catalog::Catalog;
use crate::error::{Result, StorageError};
use crate::storage::StorageManager;

/// Engine-wide settings. Mirrors the handful of knobs spec.md actually
/// exposes; anything the teacher's `Config` carries for subsystems this
/// engine doesn't have (networking, replication, security) is left out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub page_size: usize,
    pub buffer_pool_capacity: usize,
    pub cleaner_interval: Duration,
    pub catalog_tablespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            page_size: crate::common::DEFAULT_PAGE_SIZE,
            buffer_pool_capacity: 64,
            cleaner_interval: Duration::from_millis(200),
            catalog_tablespace: "catalog".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load settings from a JSON config file, e.g. one written by
    /// [`Self::save_to_file`]. The file must specify every field; this
    /// does not fall back to [`Self::default`] for anything missing.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write settings to a JSON config file, creating parent directories
    /// if needed.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// One open database: the storage manager, the catalog, and a buffer pool
/// (plus background cleaner) per tablespace that has been touched.
pub struct DatabaseSystem {
    config: EngineConfig,
    storage: Arc<StorageManager>,
    catalog: Catalog,
    pools: RwLock<HashMap<String, Arc<BufferPoolManager>>>,
    cleaners: Mutex<Vec<Cleaner>>,
}

impl DatabaseSystem {
    /// Open (or create) the database at `config.data_dir`. Bootstraps the
    /// catalog by scanning the catalog tablespace's pages, and opens a
    /// buffer pool for every tablespace already on disk so it shows up in
    /// [`Self::tablespace_names`] immediately.
    pub async fn open(config: EngineConfig) -> Result<Self> {
        info!(data_dir = %config.data_dir.display(), "opening database");
        let storage = Arc::new(StorageManager::new(config.data_dir.clone(), config.page_size)?);
        let catalog = Catalog::bootstrap(&storage, &config.catalog_tablespace, config.buffer_pool_capacity)?;

        let system = Self {
            config,
            storage,
            catalog,
            pools: RwLock::new(HashMap::new()),
            cleaners: Mutex::new(Vec::new()),
        };

        let on_disk: std::collections::HashSet<String> = system.storage.discover_on_disk()?.into_iter().collect();
        for name in &on_disk {
            if *name == system.config.catalog_tablespace {
                continue;
            }
            system.buffer_pool(name)?;
        }

        // A tablespace named in SYS_TABLESPACES but with no container file
        // on disk is not fatal: log it and continue, leaving it absent from
        // `pools` until something recreates the file.
        for row in system.catalog.tablespaces()? {
            if !on_disk.contains(&row.tablespace_name) {
                warn!(tablespace = %row.tablespace_name, "container file missing for registered tablespace");
            }
        }
        Ok(system)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// The buffer pool for `tablespace_name`, opening the tablespace (and
    /// spawning its background cleaner) the first time it's requested.
    pub fn buffer_pool(&self, tablespace_name: &str) -> Result<Arc<BufferPoolManager>> {
        if let Some(pool) = self.pools.read().get(tablespace_name) {
            return Ok(pool.clone());
        }
        let ts = self.storage.open_tablespace(tablespace_name)?;
        let pool = Arc::new(BufferPoolManager::new(ts, self.config.buffer_pool_capacity));
        self.cleaners.lock().push(Cleaner::spawn(pool.clone(), self.config.cleaner_interval));
        self.pools.write().insert(tablespace_name.to_string(), pool.clone());
        Ok(pool)
    }

    /// Create a brand-new tablespace and register it in SYS_TABLESPACES.
    pub fn create_tablespace(&self, name: &str) -> Result<Arc<BufferPoolManager>> {
        let ts = self.storage.create_tablespace(name, 4)?;
        self.catalog.register_tablespace(&ts)?;
        let pool = Arc::new(BufferPoolManager::new(ts, self.config.buffer_pool_capacity));
        self.cleaners.lock().push(Cleaner::spawn(pool.clone(), self.config.cleaner_interval));
        self.pools.write().insert(name.to_string(), pool.clone());
        Ok(pool)
    }

    pub fn tablespace_names(&self) -> Vec<String> {
        self.storage.names()
    }

    /// `(tablespace, cached_pages, capacity)` for every buffer pool opened
    /// so far. Read-only inspection, no counters reset.
    pub fn buffer_pool_stats(&self) -> Vec<(String, usize, usize)> {
        self.pools
            .read()
            .iter()
            .map(|(name, pool)| (name.clone(), pool.cached_pages(), pool.capacity()))
            .collect()
    }

    /// Stop every background cleaner, flush every buffer pool, and sync
    /// every container. Aggregates failures rather than stopping at the
    /// first one; safe to call even if some tablespace never finished a
    /// clean write.
    pub async fn shutdown(self) -> Vec<(String, StorageError)> {
        info!("shutting down database");
        for cleaner in self.cleaners.into_inner() {
            cleaner.stop().await;
        }

        let mut errors = Vec::new();
        for (name, pool) in self.pools.into_inner() {
            if let Err(flush_errors) = pool.flush_all() {
                for (page_number, err) in flush_errors {
                    warn!(tablespace = %name, page_number, %err, "flush failed during shutdown");
                    errors.push((name.clone(), err));
                }
            }
        }
        errors.extend(self.storage.close_all());
        errors
    }
}
