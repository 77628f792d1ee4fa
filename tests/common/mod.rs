#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::{Method, StatusCode};
use tollgate::{Pipeline, RateLimitOptions, RateLimiter, Request, Response, TokenValidator};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// An `Authorization` header value whose token expires `secs` from now.
pub fn bearer_expiring_in(secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + secs;
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"tester","exp":{exp}}}"#));
    format!("Bearer {header}.{payload}.c2lnbmF0dXJl")
}

pub fn valid_bearer() -> String {
    bearer_expiring_in(3600)
}

pub fn authed(method: Method, target: &str) -> Request {
    Request::new(method, target).with_header("Authorization", &valid_bearer())
}

pub fn options(permit_limit: u32, queue_limit: u32) -> RateLimitOptions {
    RateLimitOptions { permit_limit, window: Duration::from_secs(60), queue_limit }
}

/// Terminal handler that counts and records every request it sees.
#[derive(Clone, Default)]
pub struct Spy {
    calls: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
}

impl Spy {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    /// A handler answering every request with `status` and no body.
    pub fn handler(
        &self,
        status: StatusCode,
    ) -> impl Fn(Request) -> std::future::Ready<Result<Response, std::convert::Infallible>>
    + Send
    + Sync
    + 'static {
        let spy = self.clone();
        move |req: Request| {
            spy.calls.fetch_add(1, Ordering::SeqCst);
            spy.paths.lock().unwrap().push(req.path().to_owned());
            std::future::ready(Ok(Response::status(status)))
        }
    }
}

/// The standard pipeline in front of a spy answering `200 OK`.
pub fn spied_pipeline(options: RateLimitOptions) -> (Pipeline, Spy, Arc<RateLimiter>) {
    let spy = Spy::default();
    let limiter = Arc::new(RateLimiter::new(options));
    let pipeline = Pipeline::new(Arc::clone(&limiter), TokenValidator::new(), spy.handler(StatusCode::OK));
    (pipeline, spy, limiter)
}

/// Lets spawned tasks on a current-thread runtime run until they block.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub fn body_json(res: &Response) -> serde_json::Value {
    serde_json::from_slice(res.body()).expect("response body is JSON")
}

// ── Log capture ───────────────────────────────────────────────────────────────

/// Collects formatted log output from the current thread.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Installs a thread-local subscriber writing into the capture.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.contents().lines().filter(|l| l.contains(needle)).map(str::to_owned).collect()
    }
}

pub struct CaptureWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter { buf: Arc::clone(&self.buf) }
    }
}
