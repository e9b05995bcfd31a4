//! Bounded memoization of parsed locators.
//!
//! Loaders share one of these so repeated requests for the same locator reuse
//! the instance whose escaped address and cache key bytes are already
//! computed. Safe for concurrent get/put from worker threads.

use super::IntegrityLocator;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

/// Default number of locators kept.
pub const DEFAULT_CAPACITY: usize = 500;

/// LRU cache mapping a locator to its memoized instance.
///
/// Lookups go by locator identity (address and headers). [`get_or_insert`]
/// additionally requires the expected checksum to match, so a locator built
/// with a different checksum for the same address replaces the old one
/// instead of inheriting it.
///
/// [`get_or_insert`]: LocatorCache::get_or_insert
pub struct LocatorCache {
    inner: Mutex<LruCache<IntegrityLocator, IntegrityLocator>>,
}

impl Default for LocatorCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LocatorCache {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &IntegrityLocator) -> Option<IntegrityLocator> {
        self.lock().get(key).cloned()
    }

    pub fn put(&self, key: IntegrityLocator, value: IntegrityLocator) {
        self.lock().put(key, value);
    }

    /// Return the memoized instance equal to `locator` and carrying the same
    /// checksum, inserting `locator` first if there is none.
    pub fn get_or_insert(&self, locator: IntegrityLocator) -> IntegrityLocator {
        let mut lru = self.lock();
        if let Some(hit) = lru.get(&locator) {
            if hit.expected_checksum() == locator.expected_checksum() {
                return hit.clone();
            }
        }
        lru.put(locator.clone(), locator.clone());
        locator
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<IntegrityLocator, IntegrityLocator>> {
        // The map stays consistent even if a holder panicked mid-call.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
