//! Turns a resource model plus request options into a cache key and a fetcher.

use crate::cache::DataCacheKey;
use crate::fetch::{CurlTransport, FetchOptions, RedirectingFetcher, Transport};
use crate::locator::{LocatorCache, ResourceModel};
use crate::options::{self, RequestOptions};
use crate::strategy::DiskCacheStrategy;
use std::sync::Arc;

/// Everything needed to load one resource.
pub struct LoadData {
    pub key: DataCacheKey,
    pub fetcher: RedirectingFetcher,
    pub strategy: DiskCacheStrategy,
}

/// Builds [`LoadData`], reusing equal locators through an optional
/// [`LocatorCache`].
pub struct IntegrityLoader {
    transport: Arc<dyn Transport>,
    memo: Option<Arc<LocatorCache>>,
}

impl IntegrityLoader {
    pub fn new(transport: Arc<dyn Transport>, memo: Option<Arc<LocatorCache>>) -> Self {
        Self { transport, memo }
    }

    /// Loader over libcurl with a default-sized locator memo.
    pub fn with_curl() -> Self {
        Self::new(
            Arc::new(CurlTransport),
            Some(Arc::new(LocatorCache::default())),
        )
    }

    pub fn memo(&self) -> Option<&LocatorCache> {
        self.memo.as_deref()
    }

    /// Plain models get a fetcher that delivers unverified bytes.
    pub fn build_load_data(&self, model: &ResourceModel, opts: &RequestOptions) -> LoadData {
        let model = match (model, &self.memo) {
            (ResourceModel::Verified(locator), Some(memo)) => {
                ResourceModel::Verified(memo.get_or_insert(locator.clone()))
            }
            _ => model.clone(),
        };
        let fetch_options = FetchOptions::from_request(opts);
        let strategy = opts.get(&options::DISK_CACHE_STRATEGY);
        tracing::trace!(
            url = model.address(),
            max_redirects = fetch_options.max_redirects,
            strategy = strategy.as_str(),
            "building load data"
        );
        LoadData {
            key: DataCacheKey::new(model.clone()),
            fetcher: RedirectingFetcher::for_model(model, fetch_options, self.transport.clone()),
            strategy,
        }
    }
}
