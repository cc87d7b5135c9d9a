//! Per-key asynchronous mutual exclusion.
//!
//! Operations on one key are serialized; operations on different keys never
//! contend on a shared lock beyond the sharded map lookup.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A lazily-populated map of one async mutex per key.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    inner: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let mutex = self.handle(key);
        mutex.lock_owned().await
    }

    fn handle(&self, key: &K) -> Arc<Mutex<()>> {
        // Clone the Arc so the shard guard is released before awaiting.
        self.inner.entry(key.clone()).or_default().value().clone()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
