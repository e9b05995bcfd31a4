//! Disk caching with checksum verification on read.
//!
//! [`DiskLruCache`] stores bytes; [`VerifyingDiskCache`] wraps any
//! [`DiskCache`] and re-digests entries whose key carries a checksum, so a
//! corrupted or stale file reads as a miss.

mod factory;
pub mod key;
mod disk_lru;
mod verifying;

pub use factory::{CacheError, DiskCacheFactory, LazyDiskCache, DEFAULT_DISK_CACHE_SIZE};
pub use key::{safe_key, CacheKey, DataCacheKey, DerivedCacheKey};
pub use disk_lru::{DiskLruCache, JOURNAL_FILE, TEMP_SUFFIX};
pub use verifying::VerifyingDiskCache;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Fills a temporary file during [`DiskCache::put`]. The file is only
/// committed when `write` returns `Ok`.
pub trait Writer {
    fn write(&mut self, file: &Path) -> io::Result<()>;
}

impl<F> Writer for F
where
    F: FnMut(&Path) -> io::Result<()>,
{
    fn write(&mut self, file: &Path) -> io::Result<()> {
        (self)(file)
    }
}

/// Writer that copies `reader` into the cache file.
pub fn stream_writer<R: Read>(mut reader: R) -> impl FnMut(&Path) -> io::Result<()> {
    move |file: &Path| {
        let mut out = File::create(file)?;
        io::copy(&mut reader, &mut out)?;
        out.sync_all()
    }
}

/// Key-addressed file store.
pub trait DiskCache: Send + Sync {
    /// Path of the entry for `key`, or `None` on a miss.
    fn get(&self, key: &dyn CacheKey) -> Option<PathBuf>;
    fn put(&self, key: &dyn CacheKey, writer: &mut dyn Writer) -> io::Result<()>;
    fn delete(&self, key: &dyn CacheKey);
    fn clear(&self);

    /// `false` when entries cannot be stored at all, e.g. a lazily built
    /// cache whose directory was unusable. Callers then load without it.
    fn is_available(&self) -> bool {
        true
    }
}
