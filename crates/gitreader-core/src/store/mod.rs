pub mod cache;
pub mod locks;

use std::path::{Path, PathBuf};

use crate::errors::GitReaderResult;
use crate::store::cache::IndexStore;
use crate::store::locks::BuildLocks;

/// Explicit cache handle: repository snapshots under `repos/`, serialized
/// indexes under `index/`. Create once and pass by reference.
#[derive(Debug)]
pub struct Workspace {
    cache_root: PathBuf,
    store: IndexStore,
    locks: BuildLocks,
}

impl Workspace {
    pub fn open(cache_root: impl Into<PathBuf>) -> GitReaderResult<Self> {
        let cache_root = cache_root.into();
        std::fs::create_dir_all(cache_root.join("repos"))?;
        std::fs::create_dir_all(cache_root.join("index"))?;
        Ok(Self {
            store: IndexStore::new(cache_root.join("index")),
            locks: BuildLocks::new(),
            cache_root,
        })
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.cache_root.join("repos")
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn locks(&self) -> &BuildLocks {
        &self.locks
    }
}
