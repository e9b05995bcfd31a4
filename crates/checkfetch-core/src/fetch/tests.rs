//! Fetcher tests against a scripted in-memory transport.

use super::*;
use crate::checksum::digests_started;
use crate::locator::Headers;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::AtomicUsize;

const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

#[derive(Clone)]
struct Canned {
    status: i32,
    message: &'static str,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Canned {
    fn ok(body: &[u8]) -> Self {
        Self {
            status: 200,
            message: "OK",
            headers: vec![("Content-Length".into(), body.len().to_string())],
            body: body.to_vec(),
        }
    }

    fn redirect(status: i32, location: &str) -> Self {
        Self {
            status,
            message: "Found",
            headers: vec![("Location".into(), location.into())],
            body: Vec::new(),
        }
    }

    fn status(status: i32, message: &'static str) -> Self {
        Self {
            status,
            message,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

#[derive(Default)]
struct ScriptedTransport {
    routes: HashMap<String, Canned>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    refuse: bool,
}

impl ScriptedTransport {
    fn route(mut self, url: &str, canned: Canned) -> Self {
        self.routes.insert(url.to_string(), canned);
        self
    }

    fn requested(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(u, _)| u.clone())
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn connect(&self, request: &ConnectRequest<'_>) -> Result<Response, ConnectError> {
        let headers = request
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.requests
            .lock()
            .unwrap()
            .push((request.url.to_string(), headers));
        if self.refuse {
            return Err(ConnectError::new(
                INVALID_STATUS_CODE,
                io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            ));
        }
        let canned = self
            .routes
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| Canned::status(404, "Not Found"));
        Ok(Response {
            status: canned.status,
            message: canned.message.to_string(),
            headers: canned.headers,
            body: Box::new(io::Cursor::new(canned.body)),
        })
    }
}

fn locator(url: &str) -> IntegrityLocator {
    IntegrityLocator::new(url, HELLO_MD5, Headers::new()).unwrap()
}

fn fetcher(url: &str, transport: Arc<ScriptedTransport>, max_redirects: u32) -> RedirectingFetcher {
    let options = FetchOptions {
        max_redirects,
        ..FetchOptions::default()
    };
    RedirectingFetcher::new(locator(url), options, transport)
}

fn redirect_chain(hops: usize) -> ScriptedTransport {
    let mut t = ScriptedTransport::default();
    for i in 0..hops {
        t = t.route(
            &format!("https://example.com/r{i}"),
            Canned::redirect(302, &format!("/r{}", i + 1)),
        );
    }
    t.route(&format!("https://example.com/r{hops}"), Canned::ok(b"hello world"))
}

#[test]
fn matching_body_is_delivered_verified() {
    let url = format!("https://example.com/a.bin?md5={HELLO_MD5}");
    let t = Arc::new(ScriptedTransport::default().route(&url, Canned::ok(b"hello world")));
    let f = fetcher(&url, t, 5);
    let data = f.fetch(VerifyPolicy::Immediate).unwrap().expect("not cancelled");
    assert!(data.is_verified());
    assert_eq!(data.content_length(), Some(11));
    assert_eq!(data.into_bytes().unwrap(), b"hello world");
}

#[test]
fn mismatching_body_fails_without_bytes() {
    let url = format!("https://example.com/a.bin?md5={HELLO_MD5}");
    let t = Arc::new(ScriptedTransport::default().route(&url, Canned::ok(b"hello there")));
    let f = fetcher(&url, t, 5);
    match f.fetch(VerifyPolicy::Immediate) {
        Err(FetchError::ChecksumMismatch { expected, actual }) => {
            assert_eq!(expected, HELLO_MD5);
            assert_ne!(actual, HELLO_MD5);
        }
        other => panic!("expected ChecksumMismatch, got {other:?}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelAt {
    Never,
    /// Flag raised while the transfer runs; the transport then aborts.
    DuringTransfer,
    /// Flag raised once headers are in; the response is still returned.
    AfterHeaders,
}

/// Serves one 200 response and counts connects and body bytes handed out.
struct CountingTransport {
    body: Vec<u8>,
    cancel_at: CancelAt,
    connects: AtomicUsize,
    body_read: Arc<AtomicUsize>,
}

impl CountingTransport {
    fn new(body: &[u8], cancel_at: CancelAt) -> Arc<Self> {
        Arc::new(Self {
            body: body.to_vec(),
            cancel_at,
            connects: AtomicUsize::new(0),
            body_read: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn body_read(&self) -> usize {
        self.body_read.load(Ordering::SeqCst)
    }
}

struct CountingBody {
    inner: io::Cursor<Vec<u8>>,
    read: Arc<AtomicUsize>,
}

impl Read for CountingBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read.fetch_add(n, Ordering::SeqCst);
        Ok(n)
    }
}

impl Transport for CountingTransport {
    fn connect(&self, request: &ConnectRequest<'_>) -> Result<Response, ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.cancel_at {
            CancelAt::Never => {}
            CancelAt::DuringTransfer => {
                request.cancelled.store(true, Ordering::Relaxed);
                return Err(ConnectError::new(
                    INVALID_STATUS_CODE,
                    io::Error::new(io::ErrorKind::Interrupted, "callback aborted"),
                ));
            }
            CancelAt::AfterHeaders => request.cancelled.store(true, Ordering::Relaxed),
        }
        Ok(Response {
            status: 200,
            message: "OK".into(),
            headers: vec![("Content-Length".into(), self.body.len().to_string())],
            body: Box::new(CountingBody {
                inner: io::Cursor::new(self.body.clone()),
                read: Arc::clone(&self.body_read),
            }),
        })
    }
}

fn counting_fetcher(t: &Arc<CountingTransport>) -> RedirectingFetcher {
    let url = format!("https://example.com/a.bin?md5={HELLO_MD5}");
    RedirectingFetcher::new(locator(&url), FetchOptions::default(), t.clone())
}

#[test]
fn deferred_policy_skips_digest() {
    let t = CountingTransport::new(b"hello there", CancelAt::Never);
    let f = counting_fetcher(&t);
    let before = digests_started();
    let data = f.fetch(VerifyPolicy::Deferred).unwrap().unwrap();
    assert_eq!(digests_started(), before);
    assert_eq!(t.body_read(), 0, "body is handed over unread");
    assert_eq!(data.verification(), &Verification::Deferred);
    assert_eq!(data.into_bytes().unwrap(), b"hello there");
    assert_eq!(digests_started(), before);
}

#[test]
fn immediate_policy_digests_exactly_once() {
    let t = CountingTransport::new(b"hello world", CancelAt::Never);
    let f = counting_fetcher(&t);
    let before = digests_started();
    let data = f.fetch(VerifyPolicy::Immediate).unwrap().unwrap();
    assert_eq!(digests_started(), before + 1);
    assert_eq!(t.body_read(), 11);
    assert!(data.is_verified());
    assert_eq!(data.into_bytes().unwrap(), b"hello world");
    assert_eq!(digests_started(), before + 1);
}

#[test]
fn plain_source_is_delivered_unverifiable() {
    let url = "https://example.com/plain.bin";
    let t = Arc::new(ScriptedTransport::default().route(url, Canned::ok(b"anything")));
    let f = RedirectingFetcher::for_model(
        ResourceModel::Plain(url.to_string()),
        FetchOptions::default(),
        t,
    );
    assert!(f.locator().is_none());
    let data = f.fetch(VerifyPolicy::Immediate).unwrap().unwrap();
    assert_eq!(data.verification(), &Verification::Unverifiable);
    assert_eq!(data.into_bytes().unwrap(), b"anything");
}

#[test]
fn three_redirects_then_ok() {
    let t = Arc::new(redirect_chain(3));
    let f = fetcher("https://example.com/r0", Arc::clone(&t), 5);
    let data = f.fetch(VerifyPolicy::Immediate).unwrap().unwrap();
    assert_eq!(data.url().as_str(), "https://example.com/r3");
    assert_eq!(data.into_bytes().unwrap(), b"hello world");
    assert_eq!(t.requested().len(), 4);
}

#[test]
fn exactly_max_redirects_succeeds() {
    let t = Arc::new(redirect_chain(5));
    let f = fetcher("https://example.com/r0", t, 5);
    assert!(f.fetch(VerifyPolicy::Immediate).unwrap().is_some());
}

#[test]
fn one_more_than_max_redirects_fails() {
    let t = Arc::new(redirect_chain(6));
    let f = fetcher("https://example.com/r0", Arc::clone(&t), 5);
    match f.fetch(VerifyPolicy::Immediate) {
        Err(FetchError::TooManyRedirects { max }) => assert_eq!(max, 5),
        other => panic!("expected TooManyRedirects, got {other:?}"),
    }
    assert_eq!(t.requested().len(), 6, "the sixth redirect is not followed");
}

#[test]
fn redirect_to_self_is_a_loop() {
    let url = "https://example.com/a.bin";
    let t = Arc::new(ScriptedTransport::default().route(url, Canned::redirect(302, url)));
    let f = fetcher(url, Arc::clone(&t), 5);
    match f.fetch(VerifyPolicy::Immediate) {
        Err(FetchError::RedirectLoop { url: looped }) => assert_eq!(looped, url),
        other => panic!("expected RedirectLoop, got {other:?}"),
    }
    assert_eq!(t.requested().len(), 1);
}

#[test]
fn two_hop_cycle_is_only_stopped_by_the_bound() {
    let t = Arc::new(
        ScriptedTransport::default()
            .route("https://example.com/a", Canned::redirect(302, "/b"))
            .route("https://example.com/b", Canned::redirect(302, "/a")),
    );
    let f = fetcher("https://example.com/a", Arc::clone(&t), 4);
    assert!(matches!(
        f.fetch(VerifyPolicy::Immediate),
        Err(FetchError::TooManyRedirects { max: 4 })
    ));
    assert_eq!(t.requested().len(), 5);
}

#[test]
fn redirect_without_location_fails() {
    let url = "https://example.com/a";
    let t = Arc::new(ScriptedTransport::default().route(url, Canned::status(301, "Moved")));
    let f = fetcher(url, t, 5);
    assert!(matches!(
        f.fetch(VerifyPolicy::Immediate),
        Err(FetchError::EmptyRedirectTarget { status: 301 })
    ));
}

#[test]
fn status_buckets_use_integer_division() {
    let url = "https://example.com/odd";
    let mut odd_ok = Canned::ok(b"hello world");
    odd_ok.status = 299;
    let t = Arc::new(ScriptedTransport::default().route(url, odd_ok));
    assert!(fetcher(url, t, 5).fetch(VerifyPolicy::Immediate).unwrap().is_some());

    let t = Arc::new(ScriptedTransport::default().route(url, Canned::redirect(399, "/next")));
    let f = fetcher(url, Arc::clone(&t), 5);
    let _ = f.fetch(VerifyPolicy::Immediate);
    assert_eq!(t.requested()[1], "https://example.com/next");
}

#[test]
fn non_success_status_carries_code_and_message() {
    let url = "https://example.com/missing";
    let t = Arc::new(ScriptedTransport::default());
    match fetcher(url, t, 5).fetch(VerifyPolicy::Immediate) {
        Err(FetchError::HttpStatus { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Not Found");
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[test]
fn invalid_status_is_an_http_error() {
    let url = "https://example.com/garbled";
    let t = Arc::new(
        ScriptedTransport::default().route(url, Canned::status(INVALID_STATUS_CODE, "")),
    );
    let err = fetcher(url, t, 5).fetch(VerifyPolicy::Immediate).unwrap_err();
    assert_eq!(err.status(), Some(INVALID_STATUS_CODE));
}

#[test]
fn connection_failure_is_typed() {
    let t = Arc::new(ScriptedTransport {
        refuse: true,
        ..ScriptedTransport::default()
    });
    let err = fetcher("https://example.com/a", t, 5)
        .fetch(VerifyPolicy::Immediate)
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::Connection {
            status: INVALID_STATUS_CODE,
            ..
        }
    ));
}

#[test]
fn cancel_before_fetch_never_connects() {
    let t = CountingTransport::new(b"hello world", CancelAt::Never);
    let f = counting_fetcher(&t);
    f.cancel();
    assert!(f.fetch(VerifyPolicy::Immediate).unwrap().is_none());
    assert_eq!(t.connects(), 0);
    assert_eq!(t.body_read(), 0);
    f.cleanup();
    f.cleanup();
}

#[test]
fn transfer_aborted_by_cancel_is_not_an_error() {
    let t = CountingTransport::new(b"hello world", CancelAt::DuringTransfer);
    let f = counting_fetcher(&t);
    assert!(f.fetch(VerifyPolicy::Immediate).unwrap().is_none());
    assert!(f.is_cancelled());
    assert_eq!(t.connects(), 1);
}

#[test]
fn cancel_after_headers_leaves_body_unread() {
    let t = CountingTransport::new(b"hello world", CancelAt::AfterHeaders);
    let f = counting_fetcher(&t);
    let before = digests_started();
    assert!(f.fetch(VerifyPolicy::Immediate).unwrap().is_none());
    assert_eq!(t.body_read(), 0);
    assert_eq!(digests_started(), before);
}

#[test]
fn redirect_to_other_scheme_is_rejected() {
    let url = "https://example.com/a";
    let t = Arc::new(
        ScriptedTransport::default().route(url, Canned::redirect(302, "ftp://evil.example/x")),
    );
    let f = fetcher(url, Arc::clone(&t), 5);
    match f.fetch(VerifyPolicy::Immediate) {
        Err(FetchError::BadRedirectUrl {
            location,
            status,
            source,
        }) => {
            assert_eq!(location, "ftp://evil.example/x");
            assert_eq!(status, 302);
            assert!(source.is_none());
        }
        other => panic!("expected BadRedirectUrl, got {other:?}"),
    }
    assert_eq!(t.requested(), vec![url.to_string()]);
}

#[test]
fn non_http_source_is_never_connected() {
    let t = Arc::new(ScriptedTransport::default());
    let f = RedirectingFetcher::for_model(
        ResourceModel::Plain("ftp://example.com/a.bin".into()),
        FetchOptions::default(),
        t.clone(),
    );
    assert!(matches!(
        f.fetch(VerifyPolicy::Immediate),
        Err(FetchError::UnsupportedScheme { .. })
    ));
    assert!(t.requested().is_empty());
}

#[test]
fn headers_are_sent_on_every_hop() {
    let t = Arc::new(redirect_chain(2));
    let loc = locator("https://example.com/r0")
        .with_headers(Headers::new().with("Authorization", "Bearer t"));
    let f = RedirectingFetcher::new(loc, FetchOptions::default(), t.clone());
    f.fetch(VerifyPolicy::Deferred).unwrap();
    let requests = t.requests.lock().unwrap();
    assert_eq!(requests.len(), 3);
    for (_, headers) in requests.iter() {
        assert_eq!(
            headers,
            &vec![("Authorization".to_string(), "Bearer t".to_string())]
        );
    }
}

#[test]
fn short_body_is_a_read_error() {
    let url = "https://example.com/short";
    let mut canned = Canned::ok(b"hello");
    canned.headers = vec![("Content-Length".into(), "11".into())];
    let t = Arc::new(ScriptedTransport::default().route(url, canned));
    assert!(matches!(
        fetcher(url, t, 5).fetch(VerifyPolicy::Immediate),
        Err(FetchError::BodyRead { status: 200, .. })
    ));
}

#[derive(Default)]
struct Recorder {
    ready: usize,
    failed: Vec<String>,
}

impl DataCallback for Recorder {
    fn on_data_ready(&mut self, _data: Option<FetchedData>) {
        self.ready += 1;
    }

    fn on_load_failed(&mut self, error: FetchError) {
        self.failed.push(error.to_string());
    }
}

#[test]
fn load_data_invokes_exactly_one_callback() {
    let url = format!("https://example.com/a.bin?md5={HELLO_MD5}");
    let t = Arc::new(ScriptedTransport::default().route(&url, Canned::ok(b"hello world")));
    let mut ok = Recorder::default();
    fetcher(&url, Arc::clone(&t), 5).load_data(VerifyPolicy::Immediate, &mut ok);
    assert_eq!((ok.ready, ok.failed.len()), (1, 0));

    let t = Arc::new(ScriptedTransport::default().route(&url, Canned::ok(b"hello there")));
    let mut bad = Recorder::default();
    fetcher(&url, t, 5).load_data(VerifyPolicy::Immediate, &mut bad);
    assert_eq!(bad.ready, 0);
    assert_eq!(bad.failed.len(), 1);
    assert!(bad.failed[0].starts_with("checksum mismatch"));
}

#[test]
fn fetcher_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RedirectingFetcher>();
}
