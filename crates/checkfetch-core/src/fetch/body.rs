//! Response bodies handed to the consumer.

use crate::checksum::DigestResult;
use std::fmt;
use std::io::{self, Read};
use url::Url;

/// Stream wrapper that knows the declared `Content-Length` and fails when the
/// underlying stream ends early.
pub struct ContentLengthReader<R> {
    inner: R,
    content_length: Option<u64>,
    read: u64,
}

impl<R: Read> ContentLengthReader<R> {
    pub fn new(inner: R, content_length: Option<u64>) -> Self {
        Self {
            inner,
            content_length,
            read: 0,
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Bytes still expected, if the length is known.
    pub fn remaining(&self) -> Option<u64> {
        self.content_length.map(|len| len.saturating_sub(self.read))
    }
}

impl<R: Read> Read for ContentLengthReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if n == 0 && !buf.is_empty() {
            if let Some(expected) = self.content_length {
                if self.read < expected {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "failed to read all expected data: expected {}, got {}",
                            expected, self.read
                        ),
                    ));
                }
            }
        }
        Ok(n)
    }
}

/// How the bytes of a [`FetchedData`] were checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Digest computed and matched the locator's checksum.
    Verified(DigestResult),
    /// Not checked here; the verifying disk cache checks on read.
    Deferred,
    /// The source carries no checksum.
    Unverifiable,
}

/// A successful fetch: the response body plus how it was verified.
pub struct FetchedData {
    reader: Box<dyn Read + Send>,
    content_length: Option<u64>,
    verification: Verification,
    url: Url,
}

impl FetchedData {
    pub(crate) fn new(
        reader: Box<dyn Read + Send>,
        content_length: Option<u64>,
        verification: Verification,
        url: Url,
    ) -> Self {
        Self {
            reader,
            content_length,
            verification,
            url,
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn verification(&self) -> &Verification {
        &self.verification
    }

    pub fn is_verified(&self) -> bool {
        matches!(self.verification, Verification::Verified(_))
    }

    /// URL the body was served from, after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Read the remaining body into memory.
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.content_length.unwrap_or(0) as usize);
        self.reader.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Read for FetchedData {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for FetchedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedData")
            .field("url", &self.url.as_str())
            .field("content_length", &self.content_length)
            .field("verification", &self.verification)
            .finish_non_exhaustive()
    }
}
