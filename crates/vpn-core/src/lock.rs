//! Keyed async mutex.
//!
//! Serializes work per key (user id, `(user, backend)` pair) while letting
//! different keys proceed in parallel. Entries are dropped once no guard or
//! waiter references them, so the map only holds keys in use.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A map of async mutexes created on demand.
#[derive(Debug)]
pub struct KeyedMutex<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

/// Guard for one key; releases the key on drop.
#[derive(Debug)]
pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a KeyedMutex<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> KeyedMutex<K> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: K) -> KeyedGuard<'_, K> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(key.clone()).or_default().clone()
        }; // map lock released before awaiting

        // Declared before the await so an abandoned acquisition drops the
        // slot first and the waiter can then prune it.
        let mut waiter = Waiter {
            owner: self,
            key,
            armed: true,
        };
        let guard = slot.lock_owned().await;
        waiter.armed = false;
        KeyedGuard {
            owner: self,
            key: waiter.key.clone(),
            guard: Some(guard),
        }
    }

    /// Remove `key` when only the map still holds its slot.
    fn prune(&self, key: &K) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key)
            && Arc::strong_count(slot) == 1
        {
            slots.remove(key);
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.owner.prune(&self.key);
    }
}

/// Pending acquisition; prunes the slot if the caller gives up.
struct Waiter<'a, K: Eq + Hash + Clone> {
    owner: &'a KeyedMutex<K>,
    key: K,
    armed: bool,
}

impl<K: Eq + Hash + Clone> Drop for Waiter<'_, K> {
    fn drop(&mut self) {
        if self.armed {
            self.owner.prune(&self.key);
        }
    }
}
