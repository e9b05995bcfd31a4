//! Disk cache keys.
//!
//! A key contributes its identity to a SHA-256 digest that names the cache
//! file. Keys built from raw source bytes can also hand back the locator they
//! were built from, which is how the verifying cache finds the checksum to
//! check; derived keys never do.

use crate::locator::{IntegrityLocator, ResourceModel};
use sha2::{Digest, Sha256};

/// Identity of a disk cache entry.
pub trait CacheKey: Send + Sync {
    /// Feed this key's identity into the file name digest.
    fn update_disk_cache_key(&self, digest: &mut Sha256);

    /// The checksum-bearing locator behind this key, if any.
    fn source_locator(&self) -> Option<&IntegrityLocator> {
        None
    }
}

/// Lowercase hex SHA-256 of the key, used as the on-disk file name.
pub fn safe_key(key: &dyn CacheKey) -> String {
    let mut digest = Sha256::new();
    key.update_disk_cache_key(&mut digest);
    hex::encode(digest.finalize())
}

impl CacheKey for IntegrityLocator {
    fn update_disk_cache_key(&self, digest: &mut Sha256) {
        IntegrityLocator::update_disk_cache_key(self, digest);
    }

    fn source_locator(&self) -> Option<&IntegrityLocator> {
        Some(self)
    }
}

/// Key for the raw bytes of a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataCacheKey {
    source: ResourceModel,
}

impl DataCacheKey {
    pub fn new(source: ResourceModel) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &ResourceModel {
        &self.source
    }
}

impl CacheKey for DataCacheKey {
    fn update_disk_cache_key(&self, digest: &mut Sha256) {
        self.source.update_disk_cache_key(digest);
    }

    fn source_locator(&self) -> Option<&IntegrityLocator> {
        self.source.locator()
    }
}

/// Key for content computed from already-verified source bytes (a resized or
/// re-encoded variant). Carries no checksum of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedCacheKey {
    source: ResourceModel,
    variant: String,
}

impl DerivedCacheKey {
    pub fn new(source: ResourceModel, variant: impl Into<String>) -> Self {
        Self {
            source,
            variant: variant.into(),
        }
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }
}

impl CacheKey for DerivedCacheKey {
    fn update_disk_cache_key(&self, digest: &mut Sha256) {
        // address then variant, no delimiter
        self.source.update_disk_cache_key(digest);
        digest.update(self.variant.as_bytes());
    }
}
