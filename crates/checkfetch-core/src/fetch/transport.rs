//! HTTP transport used by the redirecting fetcher.
//!
//! The default transport is libcurl via the `curl` crate. Redirect following
//! is switched off here; the fetcher walks redirects itself so it can bound
//! and loop-check them.

use super::INVALID_STATUS_CODE;
use crate::locator::Headers;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

/// Everything a transport needs to open one connection.
#[derive(Debug, Clone)]
pub struct ConnectRequest<'a> {
    pub url: &'a Url,
    pub headers: &'a Headers,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Set when the fetch is cancelled. Transports should stop transferring
    /// and return an error once they see it.
    pub cancelled: &'a AtomicBool,
}

impl ConnectRequest<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// An open response: status line, headers, and a body stream.
pub struct Response {
    pub status: i32,
    /// Reason phrase from the status line (e.g. "Not Found").
    pub message: String,
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn Read + Send>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `Content-Encoding` value, if present and non-empty.
    pub fn content_encoding(&self) -> Option<&str> {
        self.header("content-encoding").filter(|v| !v.is_empty())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok())
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("message", &self.message)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Transport-level failure with the best status code available, or
/// [`INVALID_STATUS_CODE`] when none was received.
#[derive(Debug)]
pub struct ConnectError {
    pub status: i32,
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl ConnectError {
    pub fn new<E>(status: i32, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            status,
            source: source.into(),
        }
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection failed (status {}): {}", self.status, self.source)
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Opens one HTTP connection without following redirects or caching.
pub trait Transport: Send + Sync {
    fn connect(&self, request: &ConnectRequest<'_>) -> Result<Response, ConnectError>;
}

/// libcurl transport. The body is spooled to an anonymous temp file so
/// large responses never sit in memory unless the caller buffers them.
/// A cancelled request aborts from the progress, header or write callback,
/// whichever runs first, so no further body bytes are taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurlTransport;

fn setup_err(e: curl::Error) -> ConnectError {
    ConnectError::new(INVALID_STATUS_CODE, e)
}

impl Transport for CurlTransport {
    fn connect(&self, request: &ConnectRequest<'_>) -> Result<Response, ConnectError> {
        let mut spool = tempfile::tempfile().map_err(|e| ConnectError::new(INVALID_STATUS_CODE, e))?;
        let mut lines: Vec<String> = Vec::new();
        let mut write_error: Option<io::Error> = None;

        let mut easy = curl::easy::Easy::new();
        easy.url(request.url.as_str()).map_err(setup_err)?;
        easy.follow_location(false).map_err(setup_err)?;
        easy.connect_timeout(request.connect_timeout)
            .map_err(setup_err)?;
        // libcurl has no per-read timeout; abort when nothing arrives for the
        // read timeout instead. Its resolution is whole seconds and 0 disables it.
        easy.low_speed_limit(1).map_err(setup_err)?;
        easy.low_speed_time(request.read_timeout.max(Duration::from_secs(1)))
            .map_err(setup_err)?;
        easy.progress(true).map_err(setup_err)?;

        let mut list = curl::easy::List::new();
        for (k, v) in request.headers.iter() {
            list.append(&format!("{}: {}", k.trim(), v.trim()))
                .map_err(setup_err)?;
        }
        if !request.headers.is_empty() {
            easy.http_headers(list).map_err(setup_err)?;
        }

        let performed = {
            let mut transfer = easy.transfer();
            transfer
                .progress_function(|_, _, _, _| !request.is_cancelled())
                .map_err(setup_err)?;
            transfer
                .header_function(|data| {
                    if let Ok(s) = str::from_utf8(data) {
                        lines.push(s.trim_end().to_string());
                    }
                    !request.is_cancelled()
                })
                .map_err(setup_err)?;
            transfer
                .write_function(|data| {
                    if request.is_cancelled() {
                        return Ok(0);
                    }
                    match spool.write_all(data) {
                        Ok(()) => Ok(data.len()),
                        Err(e) => {
                            tracing::warn!("response spool write failed: {}", e);
                            write_error = Some(e);
                            Ok(0) // abort transfer
                        }
                    }
                })
                .map_err(setup_err)?;
            transfer.perform()
        };

        let code = easy
            .response_code()
            .ok()
            .filter(|c| *c != 0)
            .map(|c| c as i32)
            .unwrap_or(INVALID_STATUS_CODE);

        if let Err(e) = performed {
            if let Some(io_err) = write_error {
                return Err(ConnectError::new(code, io_err));
            }
            return Err(ConnectError::new(code, e));
        }

        spool
            .seek(SeekFrom::Start(0))
            .map_err(|e| ConnectError::new(code, e))?;

        let (message, headers) = parse_header_lines(&lines);
        Ok(Response {
            status: code,
            message,
            headers,
            body: Box::new(spool),
        })
    }
}

/// Split raw header lines into the reason phrase of the last status line and
/// the header pairs that follow it. Interim responses (e.g. `100 Continue`)
/// are discarded.
pub(crate) fn parse_header_lines(lines: &[String]) -> (String, Vec<(String, String)>) {
    let mut message = String::new();
    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            headers.clear();
            message = line.splitn(3, ' ').nth(2).unwrap_or("").to_string();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    (message, headers)
}
