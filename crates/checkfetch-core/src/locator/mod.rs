//! Checksum-bearing resource locators.
//!
//! A locator pairs a remote address with the checksum its bytes must hash to.
//! Identity (equality, hashing, cache key) is the un-escaped address plus the
//! header set; the checksum is left out, so two references to the
//! same content collapse onto one cache entry.
//!
//! Addresses that carry no usable checksum, or are not `http`/`https`, are
//! not an error: [`parse`] falls back to [`ResourceModel::Plain`], which loads
//! without verification.

mod escape;
mod headers;
pub mod memo;

pub use escape::{escape_address, ALLOWED_URI_CHARS};
pub use headers::Headers;
pub use memo::LocatorCache;

use crate::checksum::DigestResult;
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Default query parameter holding the expected checksum.
pub const DEFAULT_CHECKSUM_PARAM: &str = "md5";

/// Only these schemes are fetched.
pub fn is_http_scheme(scheme: &str) -> bool {
    scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
}

/// Why a locator could not be built by the strict constructor.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LocatorError {
    #[error("locator address is empty")]
    EmptyAddress,
    #[error("locator checksum is empty")]
    EmptyChecksum,
    #[error("invalid checksum {0:?}: expected 32 or 64 hex characters")]
    InvalidChecksum(String),
}

/// An address together with its expected checksum and request headers.
#[derive(Clone)]
pub struct IntegrityLocator {
    address: String,
    checksum: DigestResult,
    headers: Headers,
    escaped: OnceLock<String>,
    cache_key_bytes: OnceLock<Vec<u8>>,
}

impl IntegrityLocator {
    /// Build a locator, validating the checksum.
    pub fn new(address: &str, checksum: &str, headers: Headers) -> Result<Self, LocatorError> {
        if address.is_empty() {
            return Err(LocatorError::EmptyAddress);
        }
        if checksum.trim().is_empty() {
            return Err(LocatorError::EmptyChecksum);
        }
        let checksum = DigestResult::parse(checksum)
            .ok_or_else(|| LocatorError::InvalidChecksum(checksum.to_string()))?;
        Ok(Self {
            address: address.to_string(),
            checksum,
            headers,
            escaped: OnceLock::new(),
            cache_key_bytes: OnceLock::new(),
        })
    }

    /// Returns a copy carrying `headers` instead of the current set.
    pub fn with_headers(&self, headers: Headers) -> Self {
        Self {
            address: self.address.clone(),
            checksum: self.checksum.clone(),
            headers,
            escaped: OnceLock::new(),
            cache_key_bytes: OnceLock::new(),
        }
    }

    pub fn expected_checksum(&self) -> &DigestResult {
        &self.checksum
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The address as given, without escaping.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Address safe to hand to an HTTP client. Computed once.
    pub fn escaped_address(&self) -> &str {
        self.escaped.get_or_init(|| escape_address(&self.address))
    }

    /// Inexpensive disk cache key: the un-escaped address, headers excluded.
    pub fn cache_key(&self) -> &str {
        &self.address
    }

    pub fn cache_key_bytes(&self) -> &[u8] {
        self.cache_key_bytes
            .get_or_init(|| self.cache_key().as_bytes().to_vec())
    }

    /// Contribute this locator's identity to an on-disk file name digest.
    pub fn update_disk_cache_key(&self, digest: &mut Sha256) {
        digest.update(self.cache_key_bytes());
    }
}

impl PartialEq for IntegrityLocator {
    fn eq(&self, other: &Self) -> bool {
        self.cache_key() == other.cache_key() && self.headers == other.headers
    }
}

impl Eq for IntegrityLocator {}

impl Hash for IntegrityLocator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cache_key().hash(state);
        self.headers.hash(state);
    }
}

impl fmt::Debug for IntegrityLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityLocator")
            .field("address", &self.address)
            .field("checksum", &self.checksum.as_str())
            .field("headers", &self.headers)
            .finish()
    }
}

impl fmt::Display for IntegrityLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_key())
    }
}

/// Result of parsing a user-supplied address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceModel {
    /// Address with an extractable checksum; bytes are verified.
    Verified(IntegrityLocator),
    /// Address loaded without integrity protection.
    Plain(String),
}

impl ResourceModel {
    pub fn address(&self) -> &str {
        match self {
            ResourceModel::Verified(l) => l.address(),
            ResourceModel::Plain(s) => s,
        }
    }

    pub fn locator(&self) -> Option<&IntegrityLocator> {
        match self {
            ResourceModel::Verified(l) => Some(l),
            ResourceModel::Plain(_) => None,
        }
    }

    pub fn update_disk_cache_key(&self, digest: &mut Sha256) {
        match self {
            ResourceModel::Verified(l) => l.update_disk_cache_key(digest),
            ResourceModel::Plain(s) => digest.update(s.as_bytes()),
        }
    }
}

/// Extract the checksum from the `checksum_param` query parameter of
/// `address`. Malformed addresses and missing or unusable checksums degrade
/// to [`ResourceModel::Plain`]; the reason is logged.
pub fn parse(address: &str, checksum_param: &str) -> ResourceModel {
    parse_with_headers(address, checksum_param, Headers::new())
}

/// Like [`parse`], attaching `headers` to the resulting locator.
pub fn parse_with_headers(address: &str, checksum_param: &str, headers: Headers) -> ResourceModel {
    let parsed = match url::Url::parse(address) {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!(address, error = %e, "using plain address: not a valid URL");
            return ResourceModel::Plain(address.to_string());
        }
    };
    if !is_http_scheme(parsed.scheme()) {
        tracing::warn!(
            address,
            scheme = parsed.scheme(),
            "using plain address: not an http(s) URL"
        );
        return ResourceModel::Plain(address.to_string());
    }

    let value = parsed
        .query_pairs()
        .find(|(k, _)| k == checksum_param)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty());

    let Some(value) = value else {
        tracing::warn!(
            address,
            param = checksum_param,
            "using plain address: no checksum parameter"
        );
        return ResourceModel::Plain(address.to_string());
    };

    match IntegrityLocator::new(address, &value, headers) {
        Ok(l) => ResourceModel::Verified(l),
        Err(e) => {
            tracing::warn!(address, error = %e, "using plain address: unusable checksum");
            ResourceModel::Plain(address.to_string())
        }
    }
}
