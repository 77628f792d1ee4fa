//! Middleware layer.
//!
//! Interceptors sit between the server and the terminal handler and carry the
//! cross-cutting concerns: error translation, admission control,
//! authentication and access logging.
//!
//! Every interceptor receives the request plus a [`Next`] handle and must do
//! exactly one of two things:
//!
//! - **short-circuit**: return a response without touching `next`, or
//! - **delegate**: call [`Next::run`] once and (optionally) inspect or rewrite
//!   what comes back.
//!
//! `Next::run` takes `self` by value, so delegating twice does not compile.
//!
//! Built-in interceptors:
//! - [`ErrorTranslation`] — failures and bare 404s → JSON envelopes
//! - [`RateLimit`] — per-client fixed-window admission, 429 on overflow
//! - [`Authentication`] — bearer-token gate, 401 on failure
//! - [`AccessLog`] — entry/exit events with latency

use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;

mod auth;
mod errors;
mod logging;
mod rate_limit;

pub use auth::Authentication;
pub use errors::{ErrorTranslation, internal_error};
pub use logging::AccessLog;
pub use rate_limit::{RateLimit, client_key};

/// A pipeline stage.
///
/// Implementations clone whatever state they need into the returned future;
/// it must be `'static` so it can outlive the borrow of `self`.
pub trait Interceptor: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> BoxFuture;
}

/// Shared, immutable chain: ordered stages plus the terminal handler.
pub(crate) struct Chain {
    pub(crate) stages: Vec<Arc<dyn Interceptor>>,
    pub(crate) endpoint: BoxedHandler,
}

/// The remainder of the chain after the current stage.
pub struct Next {
    chain: Arc<Chain>,
    index: usize,
}

impl Next {
    pub(crate) fn start(chain: Arc<Chain>) -> Self {
        Self { chain, index: 0 }
    }

    /// Hands the request to the next stage, or to the terminal handler when
    /// no stages remain.
    pub fn run(self, req: Request) -> BoxFuture {
        match self.chain.stages.get(self.index) {
            Some(stage) => {
                let stage = Arc::clone(stage);
                let next = Next { chain: self.chain, index: self.index + 1 };
                stage.call(req, next)
            }
            None => self.chain.endpoint.call(req),
        }
    }
}
