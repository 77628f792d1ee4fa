//! Pipeline composition.
//!
//! The standard chain is fixed:
//!
//! ```text
//! request
//!   → ErrorTranslation   sees every failure and status produced inside it
//!   → RateLimit          turns clients away before any auth or handler work
//!   → Authentication     401 before the handler runs
//!   → AccessLog          times the handler, logs entry and exit
//!   → terminal handler   (router / CRUD layer)
//! ```
//!
//! Outer stages observe the effects of inner ones, so instrumentation and
//! error translation sit outside, and admission control runs before anything
//! costly.

use std::sync::Arc;

use crate::handler::Handler;
use crate::limiter::RateLimiter;
use crate::middleware::{
    AccessLog, Authentication, Chain, ErrorTranslation, Interceptor, Next, RateLimit,
    internal_error,
};
use crate::request::Request;
use crate::response::Response;
use crate::token::TokenValidator;

/// An ordered, immutable interceptor chain in front of one terminal handler.
///
/// Cloning is cheap and shares the chain.
#[derive(Clone)]
pub struct Pipeline {
    chain: Arc<Chain>,
}

impl Pipeline {
    /// Builds the standard Error → RateLimit → Auth → Logging chain.
    pub fn new(limiter: Arc<RateLimiter>, validator: TokenValidator, endpoint: impl Handler) -> Self {
        tracing::warn!(
            "bearer tokens are checked for shape and expiry only; signatures are NOT verified"
        );
        Self::from_stages(
            vec![
                Arc::new(ErrorTranslation::new()),
                Arc::new(RateLimit::new(limiter)),
                Arc::new(Authentication::new(validator)),
                Arc::new(AccessLog::new()),
            ],
            endpoint,
        )
    }

    /// Composes `stages` outermost-first in front of `endpoint`.
    ///
    /// Put [`ErrorTranslation`] first unless something else guarantees that
    /// failures are handled; [`handle`](Self::handle) falls back to a bare
    /// `500` envelope otherwise.
    pub fn from_stages(stages: Vec<Arc<dyn Interceptor>>, endpoint: impl Handler) -> Self {
        Self {
            chain: Arc::new(Chain { stages, endpoint: endpoint.into_boxed_handler() }),
        }
    }

    /// Number of interceptors in front of the terminal handler.
    pub fn len(&self) -> usize {
        self.chain.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.stages.is_empty()
    }

    /// Runs one request through the chain. Always produces a response.
    pub async fn handle(&self, req: Request) -> Response {
        match Next::start(Arc::clone(&self.chain)).run(req).await {
            Ok(res) => res,
            Err(e) => {
                tracing::error!(error = %e, "failure escaped the pipeline");
                internal_error(&e.to_string())
            }
        }
    }
}
