//! Request-scoped options read through typed keys with defaults.

use crate::strategy::DiskCacheStrategy;
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;

/// A typed option key. Reading an unset key yields `default`.
pub struct OptionKey<T: 'static> {
    name: &'static str,
    default: fn() -> T,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> OptionKey<T> {
    pub const fn new(name: &'static str, default: fn() -> T) -> Self {
        Self {
            name,
            default,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_value(&self) -> T {
        (self.default)()
    }
}

fn default_timeout() -> Duration {
    Duration::from_millis(2500)
}

fn default_max_redirects() -> u32 {
    5
}

/// Connect timeout for network fetches. Defaults to 2500 ms.
pub static CONNECT_TIMEOUT: OptionKey<Duration> =
    OptionKey::new("checkfetch.fetch.connect_timeout", default_timeout);

/// Read timeout for network fetches. Defaults to 2500 ms.
pub static READ_TIMEOUT: OptionKey<Duration> =
    OptionKey::new("checkfetch.fetch.read_timeout", default_timeout);

/// Maximum number of redirects a fetch follows. Defaults to 5.
pub static MAX_REDIRECTS: OptionKey<u32> =
    OptionKey::new("checkfetch.fetch.max_redirects", default_max_redirects);

/// Disk cache strategy of the request; decides where verification happens.
pub static DISK_CACHE_STRATEGY: OptionKey<DiskCacheStrategy> = OptionKey::new(
    "checkfetch.cache.strategy",
    DiskCacheStrategy::default,
);

/// Option values for one request.
#[derive(Default)]
pub struct RequestOptions {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Send + Sync + 'static>(mut self, key: &OptionKey<T>, value: T) -> Self {
        self.values.insert(key.name, Box::new(value));
        self
    }

    pub fn get<T: Clone + 'static>(&self, key: &OptionKey<T>) -> T {
        self.values
            .get(key.name)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
            .unwrap_or_else(|| key.default_value())
    }

    /// Shorthand used by request builders that track the cache strategy.
    pub fn disk_cache_strategy(self, strategy: DiskCacheStrategy) -> Self {
        self.set(&DISK_CACHE_STRATEGY, strategy)
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.values.keys().collect();
        names.sort();
        f.debug_struct("RequestOptions").field("set", &names).finish()
    }
}
