//! A tablespace names one [`StorageContainer`] and resolves it to a file
//! under the engine's data directory (spec §4.1 "Tablespace").

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::storage::container::StorageContainer;

const FILE_EXTENSION: &str = "rsc";

pub fn container_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{name}.{FILE_EXTENSION}"))
}

/// One tablespace: a name, a page size, and the container file backing it.
pub struct Tablespace {
    container: StorageContainer,
}

impl Tablespace {
    pub fn open(data_dir: &Path, name: &str, page_size: usize, initial_pages: u32) -> Result<Self> {
        let path = container_path(data_dir, name);
        let container = StorageContainer::open(name, &path, page_size, initial_pages)?;
        Ok(Self { container })
    }

    pub fn name(&self) -> &str {
        self.container.name()
    }

    pub fn page_size(&self) -> usize {
        self.container.page_size()
    }

    pub fn container(&self) -> &StorageContainer {
        &self.container
    }

    pub fn close(&self) -> Result<()> {
        self.container.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn container_path_uses_tablespace_extension() {
        let dir = tempdir().unwrap();
        let p = container_path(dir.path(), "widgets");
        assert_eq!(p.file_name().unwrap().to_str().unwrap(), "widgets.rsc");
    }

    #[test]
    fn open_creates_backing_file() {
        let dir = tempdir().unwrap();
        let ts = Tablespace::open(dir.path(), "widgets", 4096, 4).unwrap();
        assert_eq!(ts.name(), "widgets");
        assert!(container_path(dir.path(), "widgets").exists());
    }
}
