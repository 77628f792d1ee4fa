//! Access logging stage.

use http::StatusCode;

use crate::clock::Stopwatch;
use crate::handler::BoxFuture;
use crate::middleware::{Interceptor, Next};
use crate::request::Request;

/// Emits one event when a request enters and one when its response leaves.
///
/// # Example Logs
///
/// ```text
/// INFO incoming request method=GET path=/api/users/1
/// INFO outgoing response status=200 elapsed_ms=3
/// ```
///
/// The stopwatch brackets only the downstream call. Failures are not caught
/// here: the exit event reports them as status `500` (what the error stage
/// will answer) and the failure is handed back outward untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLog;

impl AccessLog {
    pub fn new() -> Self {
        Self
    }
}

impl Interceptor for AccessLog {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        Box::pin(async move {
            tracing::info!(method = %req.method(), path = %req.path(), "incoming request");

            let watch = Stopwatch::start();
            let outcome = next.run(req).await;
            let elapsed_ms = watch.elapsed_ms();

            match &outcome {
                Ok(res) => tracing::info!(
                    status = res.status_code().as_u16(),
                    elapsed_ms,
                    "outgoing response"
                ),
                Err(e) => tracing::info!(
                    status = StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                    elapsed_ms,
                    error = %e,
                    "outgoing response"
                ),
            }
            outcome
        })
    }
}
