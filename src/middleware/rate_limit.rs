//! Admission-control stage.
//!
//! Runs before authentication so saturated clients are turned away before any
//! token decoding or handler work is spent on them.

use std::sync::Arc;

use http::StatusCode;
use http::header::RETRY_AFTER;
use http::HeaderValue;
use serde_json::json;

use crate::handler::BoxFuture;
use crate::limiter::{ANONYMOUS_KEY, Admission, RateLimiter};
use crate::middleware::{Interceptor, Next};
use crate::request::Request;
use crate::response::Response;

/// Partition key for a request: the peer IP, or [`ANONYMOUS_KEY`].
pub fn client_key(req: &Request) -> String {
    req.remote_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS_KEY.to_owned())
}

/// Per-client rate limiting backed by a shared [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Interceptor for RateLimit {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let limiter = Arc::clone(&self.limiter);
        Box::pin(async move {
            let key = client_key(&req);
            match limiter.admit(&key) {
                Admission::Allowed => next.run(req).await,
                Admission::Queued(waiter) => {
                    tracing::debug!(client = %key, ticket = waiter.ticket(), "request queued");
                    if waiter.admitted().await {
                        next.run(req).await
                    } else {
                        Ok(too_many_requests(None))
                    }
                }
                Admission::Rejected { retry_after } => {
                    tracing::warn!(client = %key, "rate limit exceeded");
                    Ok(too_many_requests(Some(retry_after.as_secs_f64().ceil() as u64)))
                }
            }
        })
    }
}

fn too_many_requests(retry_after_secs: Option<u64>) -> Response {
    let mut res = Response::json_value(
        StatusCode::TOO_MANY_REQUESTS,
        &json!({ "error": "Too Many Requests" }),
    );
    if let Some(secs) = retry_after_secs {
        res.headers.insert(RETRY_AFTER, HeaderValue::from(secs));
    }
    res
}
