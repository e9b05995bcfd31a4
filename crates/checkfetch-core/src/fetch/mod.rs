//! Redirect-following HTTP fetcher with checksum verification.
//!
//! The fetcher opens one connection per hop with transport-level redirects
//! disabled and walks `3xx` responses itself, bounded by
//! [`FetchOptions::max_redirects`]. A redirect whose target equals the URL
//! that issued it fails as a loop; longer cycles are only stopped by the
//! bound. Only `http` and `https` URLs are fetched, on every hop.
//!
//! On `2xx` the body is either returned as-is ([`VerifyPolicy::Deferred`],
//! checked later by the verifying disk cache) or buffered and compared with
//! the locator's checksum ([`VerifyPolicy::Immediate`]). A mismatching body
//! is dropped; the caller only ever sees an error.
//!
//! A [`ResourceModel::Plain`] source has nothing to compare against and is
//! delivered as [`Verification::Unverifiable`].
//!
//! `cancel()` and `cleanup()` may be called from any thread while `fetch()`
//! runs. Cancellation is checked before each hop connects and again once its
//! headers are in; the transport also sees the flag and aborts an in-flight
//! transfer, which the fetcher then reports as cancelled.

mod body;
mod error;
mod transport;

pub use body::{ContentLengthReader, FetchedData, Verification};
pub use error::FetchError;
pub use transport::{ConnectError, ConnectRequest, CurlTransport, Response, Transport};

use crate::checksum;
use crate::locator::{self as loc, Headers, IntegrityLocator, ResourceModel};
use crate::options::{self, RequestOptions};
use crate::strategy::VerifyPolicy;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use url::Url;

/// Status reported when a connection failed before a status line was read.
pub const INVALID_STATUS_CODE: i32 = -1;

/// Header carrying the redirect target.
pub const REDIRECT_HEADER_FIELD: &str = "Location";

/// Network limits for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub max_redirects: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_redirects: 5,
            connect_timeout: Duration::from_millis(2500),
            read_timeout: Duration::from_millis(2500),
        }
    }
}

impl FetchOptions {
    /// Read limits from request options, falling back to the option defaults.
    pub fn from_request(opts: &RequestOptions) -> Self {
        Self {
            max_redirects: opts.get(&options::MAX_REDIRECTS),
            connect_timeout: opts.get(&options::CONNECT_TIMEOUT),
            read_timeout: opts.get(&options::READ_TIMEOUT),
        }
    }
}

/// Receives the outcome of [`RedirectingFetcher::load_data`]. Exactly one
/// method is called, exactly once.
pub trait DataCallback {
    /// `None` means the fetch was cancelled.
    fn on_data_ready(&mut self, data: Option<FetchedData>);
    fn on_load_failed(&mut self, error: FetchError);
}

pub(crate) fn is_http_ok(status: i32) -> bool {
    status / 100 == 2
}

pub(crate) fn is_http_redirect(status: i32) -> bool {
    status / 100 == 3
}

/// Fetch-scoped redirect state.
#[derive(Debug)]
struct RedirectChain {
    current: Url,
    previous: Option<Url>,
    redirects: u32,
}

/// Fetches one source, following redirects and verifying the body when the
/// source carries a checksum.
pub struct RedirectingFetcher {
    source: ResourceModel,
    options: FetchOptions,
    transport: Arc<dyn Transport>,
    cancelled: AtomicBool,
    /// Connection opened by the current hop, until its body is consumed.
    connection: Mutex<Option<Response>>,
}

impl RedirectingFetcher {
    pub fn new(
        locator: IntegrityLocator,
        options: FetchOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::for_model(ResourceModel::Verified(locator), options, transport)
    }

    /// Fetcher for either model. `Plain` sources are delivered unverified.
    pub fn for_model(
        source: ResourceModel,
        options: FetchOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            source,
            options,
            transport,
            cancelled: AtomicBool::new(false),
            connection: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &ResourceModel {
        &self.source
    }

    pub fn locator(&self) -> Option<&IntegrityLocator> {
        self.source.locator()
    }

    pub fn options(&self) -> FetchOptions {
        self.options
    }

    /// Run the fetch and report through `callback`.
    pub fn load_data(&self, policy: VerifyPolicy, callback: &mut dyn DataCallback) {
        let start = Instant::now();
        match self.fetch(policy) {
            Ok(data) => callback.on_data_ready(data),
            Err(e) => {
                tracing::debug!(url = self.source.address(), error = %e, "failed to load data for url");
                callback.on_load_failed(e);
            }
        }
        tracing::debug!(
            url = self.source.address(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "finished http fetch"
        );
    }

    /// Fetch the locator. Returns `Ok(None)` when cancelled.
    pub fn fetch(&self, policy: VerifyPolicy) -> Result<Option<FetchedData>, FetchError> {
        let escaped = match &self.source {
            ResourceModel::Verified(l) => l.escaped_address().to_string(),
            ResourceModel::Plain(address) => loc::escape_address(address),
        };
        let start = Url::parse(&escaped).map_err(|e| FetchError::InvalidUrl {
            url: escaped.clone(),
            source: e,
        })?;
        if !loc::is_http_scheme(start.scheme()) {
            return Err(FetchError::UnsupportedScheme { url: escaped });
        }
        let mut chain = RedirectChain {
            current: start,
            previous: None,
            redirects: 0,
        };

        loop {
            let hop = self.fetch_hop(&chain, policy)?;
            let next = match hop {
                Hop::Done(data) => return Ok(data),
                Hop::Redirect(next) => next,
            };
            tracing::debug!(
                from = %chain.current,
                to = %next,
                redirects = chain.redirects + 1,
                "following redirect"
            );
            let previous = std::mem::replace(&mut chain.current, next);
            chain.previous = Some(previous);
            chain.redirects += 1;
        }
    }

    fn fetch_hop(&self, chain: &RedirectChain, policy: VerifyPolicy) -> Result<Hop, FetchError> {
        if chain.previous.as_ref() == Some(&chain.current) {
            return Err(FetchError::RedirectLoop {
                url: chain.current.to_string(),
            });
        }

        if self.is_cancelled() {
            tracing::debug!(url = %chain.current, "fetch cancelled before connect");
            return Ok(Hop::Done(None));
        }

        let no_headers = Headers::new();
        let request = ConnectRequest {
            url: &chain.current,
            headers: self.locator().map_or(&no_headers, |l| l.headers()),
            connect_timeout: self.options.connect_timeout,
            read_timeout: self.options.read_timeout,
            cancelled: &self.cancelled,
        };
        let response = match self.transport.connect(&request) {
            Ok(response) => response,
            Err(e) if self.is_cancelled() => {
                tracing::debug!(url = %chain.current, error = %e, "fetch cancelled during transfer");
                return Ok(Hop::Done(None));
            }
            Err(e) => {
                return Err(FetchError::Connection {
                    status: e.status,
                    source: e.source,
                })
            }
        };

        let status = response.status;
        let message = response.message.clone();
        let location = response.header(REDIRECT_HEADER_FIELD).map(str::to_string);
        *self.lock_connection() = Some(response);

        if self.is_cancelled() {
            tracing::debug!(url = %chain.current, "fetch cancelled");
            return Ok(Hop::Done(None));
        }

        if is_http_ok(status) {
            let Some(response) = self.lock_connection().take() else {
                // cleanup() released the connection from another thread.
                return Ok(Hop::Done(None));
            };
            return self
                .read_success(response, chain, policy)
                .map(|d| Hop::Done(Some(d)));
        }

        if is_http_redirect(status) {
            let location = location.filter(|l| !l.trim().is_empty());
            let Some(location) = location else {
                return Err(FetchError::EmptyRedirectTarget { status });
            };
            let target = chain
                .current
                .join(location.trim())
                .map_err(|e| FetchError::BadRedirectUrl {
                    location: location.clone(),
                    status,
                    source: Some(e),
                })?;
            if !loc::is_http_scheme(target.scheme()) {
                return Err(FetchError::BadRedirectUrl {
                    location,
                    status,
                    source: None,
                });
            }
            if chain.redirects >= self.options.max_redirects {
                return Err(FetchError::TooManyRedirects {
                    max: self.options.max_redirects,
                });
            }
            self.cleanup();
            return Ok(Hop::Redirect(target));
        }

        Err(FetchError::HttpStatus { status, message })
    }

    fn read_success(
        &self,
        response: Response,
        chain: &RedirectChain,
        policy: VerifyPolicy,
    ) -> Result<FetchedData, FetchError> {
        let status = response.status;
        let content_length = response.content_length();
        let reader: Box<dyn Read + Send> = match response.content_encoding() {
            None => Box::new(ContentLengthReader::new(response.body, content_length)),
            Some(encoding) => {
                tracing::debug!(encoding, "got non empty content encoding");
                response.body
            }
        };

        if policy.is_deferred() {
            return Ok(FetchedData::new(
                reader,
                content_length,
                Verification::Deferred,
                chain.current.clone(),
            ));
        }

        let Some(locator) = self.locator() else {
            return Ok(FetchedData::new(
                reader,
                content_length,
                Verification::Unverifiable,
                chain.current.clone(),
            ));
        };

        let started = Instant::now();
        let mut buf = Vec::new();
        let mut reader = reader;
        reader
            .read_to_end(&mut buf)
            .map_err(|e| FetchError::BodyRead { status, source: e })?;
        drop(reader);

        let expected = locator.expected_checksum();
        let actual = checksum::digest_bytes(&buf, expected.algorithm());
        tracing::debug!(
            expected = %expected,
            actual = %actual,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "checksum computed"
        );
        if !expected.matches(&actual) {
            return Err(FetchError::ChecksumMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        let len = buf.len() as u64;
        Ok(FetchedData::new(
            Box::new(Cursor::new(buf)),
            Some(len),
            Verification::Verified(actual),
            chain.current.clone(),
        ))
    }

    /// Request cancellation. The fetch stops at its next checkpoint; a
    /// transport honoring [`ConnectRequest::cancelled`] aborts the transfer.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Release any open connection and body. Idempotent.
    pub fn cleanup(&self) {
        let _ = self.lock_connection().take();
    }

    fn lock_connection(&self) -> MutexGuard<'_, Option<Response>> {
        self.connection.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for RedirectingFetcher {
    fn drop(&mut self) {
        self.cleanup();
    }
}

enum Hop {
    Done(Option<FetchedData>),
    Redirect(Url),
}

#[cfg(test)]
mod tests;
