//! Fetch error type.

use std::io;

/// Why a fetch attempt failed. None of these are retried by the fetcher.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport failure; carries the best status code available.
    #[error("failed to connect or obtain data (status {status})")]
    Connection {
        status: i32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Response outside the 2xx/3xx buckets.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: i32, message: String },
    #[error("too many (> {max}) redirects")]
    TooManyRedirects { max: u32 },
    #[error("in redirect loop at {url}")]
    RedirectLoop { url: String },
    #[error("received empty or missing redirect location (status {status})")]
    EmptyRedirectTarget { status: i32 },
    /// Redirect target that does not parse, or is not `http`/`https`.
    #[error("bad redirect url {location:?} (status {status})")]
    BadRedirectUrl {
        location: String,
        status: i32,
        #[source]
        source: Option<url::ParseError>,
    },
    #[error("unsupported url scheme in {url:?}")]
    UnsupportedScheme { url: String },
    #[error("invalid url {url:?}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to read response body (status {status})")]
    BodyRead {
        status: i32,
        #[source]
        source: io::Error,
    },
    /// Bytes were received but their digest differs; they were discarded.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

impl FetchError {
    /// HTTP status associated with the failure, if any.
    pub fn status(&self) -> Option<i32> {
        match self {
            FetchError::Connection { status, .. }
            | FetchError::HttpStatus { status, .. }
            | FetchError::EmptyRedirectTarget { status }
            | FetchError::BadRedirectUrl { status, .. }
            | FetchError::BodyRead { status, .. } => Some(*status),
            FetchError::TooManyRedirects { .. }
            | FetchError::RedirectLoop { .. }
            | FetchError::InvalidUrl { .. }
            | FetchError::UnsupportedScheme { .. }
            | FetchError::ChecksumMismatch { .. } => None,
        }
    }

    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, FetchError::ChecksumMismatch { .. })
    }
}
