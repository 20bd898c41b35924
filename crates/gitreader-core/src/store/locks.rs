//! Per-repository build locks.
//!
//! Serializes acquire/load-check/build/save for one key within a process so
//! concurrent callers neither race on a checkout nor rebuild the same index
//! twice.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct BuildLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BuildLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared mutex for `key`, created on first use.
    ///
    /// Entries nobody else holds are pruned on each call, so the map only
    /// tracks keys with a build in flight.
    pub fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
