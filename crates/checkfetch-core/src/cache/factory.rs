//! Deferred construction of the verifying disk cache.
//!
//! The cache directory is resolved and checked on first use. A directory
//! that cannot be created or written leaves the cache unavailable, and loads
//! proceed without disk caching.

use super::key::CacheKey;
use super::disk_lru::DiskLruCache;
use super::verifying::VerifyingDiskCache;
use super::{DiskCache, Writer};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// 250 MiB.
pub const DEFAULT_DISK_CACHE_SIZE: u64 = 250 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("disk cache unavailable at {}: {reason}", path.display())]
    Unavailable { path: PathBuf, reason: String },
}

type DirectoryResolver = Box<dyn Fn() -> PathBuf + Send + Sync>;

/// Builds a verifying LRU cache in a directory resolved at build time.
pub struct DiskCacheFactory {
    resolver: DirectoryResolver,
    max_size: u64,
}

impl DiskCacheFactory {
    pub fn new<F>(resolver: F, max_size: u64) -> Self
    where
        F: Fn() -> PathBuf + Send + Sync + 'static,
    {
        Self {
            resolver: Box::new(resolver),
            max_size,
        }
    }

    /// Factory for a fixed directory.
    pub fn in_directory(directory: impl Into<PathBuf>, max_size: u64) -> Self {
        let directory = directory.into();
        Self::new(move || directory.clone(), max_size)
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Create the directory if needed, check it is a writable directory, and
    /// open the cache.
    pub fn try_build(&self) -> Result<VerifyingDiskCache<DiskLruCache>, CacheError> {
        let path = (self.resolver)();
        let unavailable = |reason: String| CacheError::Unavailable {
            path: path.clone(),
            reason,
        };

        if let Err(e) = fs::create_dir_all(&path) {
            return Err(unavailable(format!("cannot create directory: {e}")));
        }
        if !path.is_dir() {
            return Err(unavailable("not a directory".into()));
        }
        check_writable(&path).map_err(|e| unavailable(format!("not writable: {e}")))?;

        let cache = DiskLruCache::open(&path, self.max_size)
            .map_err(|e| unavailable(format!("failed to open cache: {e}")))?;
        Ok(VerifyingDiskCache::new(cache))
    }

    /// Like [`try_build`](Self::try_build) but logs the failure and returns
    /// `None`; callers then run without a disk cache.
    pub fn build(&self) -> Option<VerifyingDiskCache<DiskLruCache>> {
        match self.try_build() {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(error = %e, "running without disk cache");
                None
            }
        }
    }
}

fn check_writable(dir: &Path) -> io::Result<()> {
    tempfile::tempfile_in(dir).map(drop)
}

/// Disk cache that is built on first use. A failed build is remembered and
/// every operation then behaves as an empty, discarding cache.
pub struct LazyDiskCache {
    factory: DiskCacheFactory,
    cache: OnceLock<Option<VerifyingDiskCache<DiskLruCache>>>,
}

impl LazyDiskCache {
    pub fn new(factory: DiskCacheFactory) -> Self {
        Self {
            factory,
            cache: OnceLock::new(),
        }
    }

    /// The built cache, building it now if this is the first call.
    pub fn get_cache(&self) -> Option<&VerifyingDiskCache<DiskLruCache>> {
        self.cache.get_or_init(|| self.factory.build()).as_ref()
    }

    pub fn is_built(&self) -> bool {
        self.cache.get().is_some()
    }
}

impl DiskCache for LazyDiskCache {
    fn get(&self, key: &dyn CacheKey) -> Option<PathBuf> {
        self.get_cache()?.get(key)
    }

    fn put(&self, key: &dyn CacheKey, writer: &mut dyn Writer) -> io::Result<()> {
        match self.get_cache() {
            Some(cache) => cache.put(key, writer),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "disk cache unavailable",
            )),
        }
    }

    fn delete(&self, key: &dyn CacheKey) {
        if let Some(cache) = self.get_cache() {
            cache.delete(key);
        }
    }

    fn clear(&self) {
        if let Some(cache) = self.get_cache() {
            cache.clear();
        }
    }

    fn is_available(&self) -> bool {
        self.get_cache().is_some()
    }
}
