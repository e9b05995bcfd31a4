//! Disk cache strategy and the verify-now / defer decision derived from it.
//!
//! When a request persists raw fetched bytes, the disk cache read that follows
//! the write verifies them, so the fetcher skips its own check. Otherwise the
//! fetcher is the only place the bytes are checked and must verify at once.

use serde::{Deserialize, Serialize};

/// How a request uses the disk cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskCacheStrategy {
    /// Persist raw source bytes and derived variants.
    All,
    /// Do not touch the disk cache.
    None,
    /// Persist raw source bytes only.
    Data,
    /// Persist derived variants only.
    Resource,
    /// Persist raw bytes for remote sources.
    #[default]
    Automatic,
}

impl DiskCacheStrategy {
    /// Whether raw fetched bytes are written verbatim to the disk cache.
    pub fn caches_raw_data(self) -> bool {
        matches!(
            self,
            DiskCacheStrategy::All | DiskCacheStrategy::Data | DiskCacheStrategy::Automatic
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiskCacheStrategy::All => "all",
            DiskCacheStrategy::None => "none",
            DiskCacheStrategy::Data => "data",
            DiskCacheStrategy::Resource => "resource",
            DiskCacheStrategy::Automatic => "automatic",
        }
    }
}

impl std::str::FromStr for DiskCacheStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(DiskCacheStrategy::All),
            "none" => Ok(DiskCacheStrategy::None),
            "data" => Ok(DiskCacheStrategy::Data),
            "resource" => Ok(DiskCacheStrategy::Resource),
            "automatic" => Ok(DiskCacheStrategy::Automatic),
            other => Err(format!("unknown disk cache strategy: {other}")),
        }
    }
}

/// Where the checksum of fetched bytes is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyPolicy {
    /// The fetcher buffers and verifies before handing bytes out.
    Immediate,
    /// Raw bytes go to disk unverified; the verifying cache read checks them.
    Deferred,
}

impl VerifyPolicy {
    pub fn for_strategy(strategy: DiskCacheStrategy) -> Self {
        if strategy.caches_raw_data() {
            VerifyPolicy::Deferred
        } else {
            VerifyPolicy::Immediate
        }
    }

    pub fn is_deferred(self) -> bool {
        self == VerifyPolicy::Deferred
    }
}
