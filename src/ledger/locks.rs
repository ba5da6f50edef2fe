use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Mutual exclusion per round id.
///
/// Entries are created on demand and dropped once nobody holds or waits on
/// them, so the map only tracks rounds with in-flight requests.
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let out = {
            // The guarded data is `()`, a panic elsewhere leaves nothing half-written
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        drop(lock);
        self.locks.remove_if(key, |_, l| Arc::strong_count(l) == 1);
        out
    }

    /// Number of keys currently tracked
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}
