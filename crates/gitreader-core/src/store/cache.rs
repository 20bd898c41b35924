//! On-disk index cache: one pretty-printed JSON file per repository id.
//!
//! Loads never fail: a missing, unreadable or malformed file is a miss.
//! Saves are atomic (temp file in the same directory, then rename).

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::errors::{GitReaderError, GitReaderResult};
use crate::models::RepoIndex;

#[derive(Clone, Debug)]
pub struct IndexStore {
    index_dir: PathBuf,
}

impl IndexStore {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
        }
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn index_path(&self, repo_id: &str) -> PathBuf {
        self.index_dir.join(format!("{repo_id}.json"))
    }

    /// Cached index for `repo_id`, or `None` on any kind of miss.
    pub fn load(&self, repo_id: &str) -> Option<RepoIndex> {
        let path = self.index_path(repo_id);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(repo_id, "no cached index");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cached index unreadable");
                return None;
            }
        };
        let index: RepoIndex = match serde_json::from_slice(&raw) {
            Ok(index) => index,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cached index is corrupt");
                return None;
            }
        };
        if index.repo_id != repo_id {
            warn!(
                path = %path.display(),
                found = %index.repo_id,
                "cached index belongs to another repository"
            );
            return None;
        }
        Some(index)
    }

    /// Write `index`, replacing any previous entry. Returns the file path.
    pub fn save(&self, index: &RepoIndex) -> GitReaderResult<PathBuf> {
        std::fs::create_dir_all(&self.index_dir)?;
        let path = self.index_path(&index.repo_id);
        let mut body = serde_json::to_vec_pretty(index)?;
        body.push(b'\n');

        let mut tmp = NamedTempFile::new_in(&self.index_dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .map_err(|e| GitReaderError::Io(e.error))?;
        debug!(path = %path.display(), bytes = body.len(), "index saved");
        Ok(path)
    }
}
