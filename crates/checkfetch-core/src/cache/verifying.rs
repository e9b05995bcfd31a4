//! Verifying decorator over any [`DiskCache`].

use super::key::CacheKey;
use super::{DiskCache, Writer};
use crate::checksum;
use std::io;
use std::path::PathBuf;
use std::time::Instant;

/// Disk cache decorator that re-checks checksum-bearing entries on every read.
///
/// A mismatching entry is reported as a miss and left on disk; it is
/// overwritten by the next successful fetch or evicted by LRU order.
pub struct VerifyingDiskCache<C> {
    inner: C,
}

impl<C: DiskCache> VerifyingDiskCache<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: DiskCache> DiskCache for VerifyingDiskCache<C> {
    fn get(&self, key: &dyn CacheKey) -> Option<PathBuf> {
        let path = self.inner.get(key)?;
        let Some(locator) = key.source_locator() else {
            return Some(path);
        };

        let expected = locator.expected_checksum();
        let started = Instant::now();
        let actual = match checksum::digest_path(&path, expected.algorithm()) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to digest cache file");
                return None;
            }
        };
        tracing::debug!(
            url = %locator,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "digested cache file"
        );

        if expected.matches(&actual) {
            Some(path)
        } else {
            tracing::debug!(
                url = %locator,
                expected = %expected,
                actual = %actual,
                "cache file checksum mismatch, treating as miss"
            );
            None
        }
    }

    fn put(&self, key: &dyn CacheKey, writer: &mut dyn Writer) -> io::Result<()> {
        self.inner.put(key, writer)
    }

    fn delete(&self, key: &dyn CacheKey) {
        self.inner.delete(key);
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }
}
