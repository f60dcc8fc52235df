// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference-counted table of open containers
//!
//! Entries are keyed by (disk, log). The count is mutated only under the
//! table lock and the entry is removed in the same critical section that
//! drops its count to zero, so exactly one releaser observes "last".

use crate::id::{DiskId, LogId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Identity of a registry entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub disk_id: DiskId,
    pub log_id: LogId,
}

impl RegistryKey {
    pub fn new(disk_id: DiskId, log_id: LogId) -> Self {
        Self { disk_id, log_id }
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.disk_id, self.log_id)
    }
}

struct Entry<T> {
    refs: usize,
    value: Arc<T>,
    pending_close: bool,
}

/// Lookup table from (disk, log) to a shared container handle
pub struct ContainerRegistry<T> {
    entries: Mutex<HashMap<RegistryKey, Entry<T>>>,
}

impl<T> Default for ContainerRegistry<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> ContainerRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RegistryKey, Entry<T>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take a reference on the entry for `key`, creating it with `make`
    /// if absent. Returns the handle and whether the entry was created.
    pub fn create_or_get(&self, key: RegistryKey, make: impl FnOnce() -> T) -> (Arc<T>, bool) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(&key) {
            entry.refs += 1;
            return (Arc::clone(&entry.value), false);
        }
        let value = Arc::new(make());
        entries.insert(
            key,
            Entry {
                refs: 1,
                value: Arc::clone(&value),
                pending_close: false,
            },
        );
        (value, true)
    }

    /// Drop one reference; returns true when it was the last one and the
    /// entry has been removed.
    ///
    /// # Panics
    ///
    /// Releasing a key that holds no references is a registry bug.
    pub fn release(&self, key: &RegistryKey) -> bool {
        let mut entries = self.lock();
        // Entries never sit in the table at zero
        let remaining = entries.get_mut(key).map(|entry| {
            entry.refs -= 1;
            entry.refs
        });
        assert!(
            remaining.is_some(),
            "released registry entry {key} that is not registered"
        );
        let last = remaining == Some(0);
        if last {
            entries.remove(key);
        }
        last
    }

    /// Handle for `key` without taking a reference
    pub fn get(&self, key: &RegistryKey) -> Option<Arc<T>> {
        self.lock().get(key).map(|e| Arc::clone(&e.value))
    }

    /// Any remaining entry, used to drain the table during shutdown
    pub fn get_first(&self) -> Option<(RegistryKey, Arc<T>)> {
        self.lock()
            .iter()
            .next()
            .map(|(key, e)| (*key, Arc::clone(&e.value)))
    }

    /// Flag the entry for `key` as having a close in flight; returns false
    /// when the key is not registered
    pub fn set_pending_close(&self, key: &RegistryKey, pending: bool) -> bool {
        match self.lock().get_mut(key) {
            Some(entry) => {
                entry.pending_close = pending;
                true
            }
            None => false,
        }
    }

    pub fn is_pending_close(&self, key: &RegistryKey) -> bool {
        self.lock().get(key).is_some_and(|e| e.pending_close)
    }

    /// Current reference count, zero when absent
    pub fn ref_count(&self, key: &RegistryKey) -> usize {
        self.lock().get(key).map_or(0, |e| e.refs)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
