//! Single-load pipeline: cache read, fetch, cache write, verified read-back.
//!
//! With a raw-data strategy the fetcher defers verification and the bytes go
//! to disk first; they reach the caller only after the verifying cache has
//! re-read and matched them. Otherwise the fetcher verifies in memory and
//! nothing is cached. A cache that reports itself unavailable is treated as
//! no cache at all.

use crate::cache::{stream_writer, CacheKey, DiskCache};
use crate::fetch::{FetchError, FetchedData, Verification};
use crate::loader::{IntegrityLoader, LoadData};
use crate::locator::ResourceModel;
use crate::options::RequestOptions;
use crate::strategy::VerifyPolicy;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("load cancelled")]
    Cancelled,
    #[error("failed to write disk cache entry for {url}")]
    CacheWrite {
        url: String,
        #[source]
        source: io::Error,
    },
    /// Bytes were written to the cache but did not read back verified.
    #[error("cached bytes for {url} failed verification")]
    CacheVerification { url: String },
    #[error("failed to open cached file {}", path.display())]
    CacheRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    pub fn is_integrity_failure(&self) -> bool {
        match self {
            EngineError::Fetch(e) => e.is_integrity_failure(),
            EngineError::CacheVerification { .. } => true,
            _ => false,
        }
    }
}

/// Where delivered bytes came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    DiskCache(PathBuf),
    Network(Url),
}

/// Bytes delivered by [`Engine::load`].
pub struct Loaded {
    origin: Origin,
    verification: Verification,
    reader: Box<dyn Read + Send>,
}

impl Loaded {
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn verification(&self) -> &Verification {
        &self.verification
    }

    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.reader.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Read for Loaded {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl std::fmt::Debug for Loaded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loaded")
            .field("origin", &self.origin)
            .field("verification", &self.verification)
            .finish_non_exhaustive()
    }
}

/// Minimal host around the loader and an optional disk cache.
///
/// The cache should be a verifying one (a `VerifyingDiskCache` or a
/// `LazyDiskCache`); a raw cache would serve deferred bytes unchecked.
pub struct Engine {
    loader: IntegrityLoader,
    cache: Option<Arc<dyn DiskCache>>,
}

impl Engine {
    pub fn new(loader: IntegrityLoader, cache: Option<Arc<dyn DiskCache>>) -> Self {
        Self { loader, cache }
    }

    pub fn loader(&self) -> &IntegrityLoader {
        &self.loader
    }

    pub fn cache(&self) -> Option<&dyn DiskCache> {
        self.cache.as_deref()
    }

    pub fn load(&self, model: &ResourceModel, opts: &RequestOptions) -> Result<Loaded, EngineError> {
        let started = Instant::now();
        let LoadData {
            key,
            fetcher,
            strategy,
        } = self.loader.build_load_data(model, opts);

        let cache = self
            .cache
            .as_deref()
            .filter(|c| strategy.caches_raw_data() && c.is_available());
        let policy = match cache {
            Some(_) => VerifyPolicy::for_strategy(strategy),
            None => VerifyPolicy::Immediate,
        };

        if let Some(cache) = cache {
            if let Some(path) = cache.get(&key) {
                tracing::debug!(url = model.address(), "loaded from disk cache");
                return open_cached(&key, path);
            }
        }

        let data = fetcher.fetch(policy)?.ok_or(EngineError::Cancelled)?;
        let loaded = match cache {
            Some(cache) if policy.is_deferred() => write_and_read_back(cache, &key, model, data)?,
            _ => Loaded {
                origin: Origin::Network(data.url().clone()),
                verification: data.verification().clone(),
                reader: Box::new(data),
            },
        };
        tracing::debug!(
            url = model.address(),
            strategy = strategy.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "load finished"
        );
        Ok(loaded)
    }
}

fn verification_for(key: &dyn CacheKey) -> Verification {
    match key.source_locator() {
        Some(locator) => Verification::Verified(locator.expected_checksum().clone()),
        None => Verification::Unverifiable,
    }
}

fn open_cached(key: &dyn CacheKey, path: PathBuf) -> Result<Loaded, EngineError> {
    let file = File::open(&path).map_err(|e| EngineError::CacheRead {
        path: path.clone(),
        source: e,
    })?;
    Ok(Loaded {
        origin: Origin::DiskCache(path),
        verification: verification_for(key),
        reader: Box::new(file),
    })
}

fn write_and_read_back(
    cache: &dyn DiskCache,
    key: &dyn CacheKey,
    model: &ResourceModel,
    data: FetchedData,
) -> Result<Loaded, EngineError> {
    let mut writer = stream_writer(data);
    cache
        .put(key, &mut writer)
        .map_err(|e| EngineError::CacheWrite {
            url: model.address().to_string(),
            source: e,
        })?;

    match cache.get(key) {
        Some(path) => open_cached(key, path),
        None => {
            tracing::warn!(url = model.address(), "fetched bytes failed verification on read back");
            cache.delete(key);
            Err(EngineError::CacheVerification {
                url: model.address().to_string(),
            })
        }
    }
}
