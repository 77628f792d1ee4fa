//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router and the pipeline hold handlers of *different* types behind one
//! interface, so each handler is boxed as a trait object
//! (`dyn ErasedHandler`).
//!
//! ```text
//! async fn get_user(req: Request) -> Result<Response, StoreError> { … }
//!        ↓ router.on(Method::GET, "/api/users/{id}", get_user)
//! get_user.into_boxed_handler()                ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get_user))                ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)  at request time           ← one vtable dispatch
//!        ↓
//! BoxFuture<Result<Response, BoxError>>        ← what every stage returns
//! ```
//!
//! Handlers are fallible: an `Err` (or a panic) becomes a [`BoxError`] that
//! travels outward through the interceptors until the error interceptor turns
//! it into a `500` envelope.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::error::{BoxError, HandlerPanic};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Shared types ──────────────────────────────────────────────────────────────

/// What a handler or an interceptor produces: a response, or a failure that
/// no inner stage could turn into one.
pub type Outcome = Result<Response, BoxError>;

/// A heap-allocated, type-erased future resolving to an [`Outcome`].
///
/// `Send + 'static` let tokio move the future across worker threads.
pub type BoxFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route or terminal handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// function with the shape:
///
/// ```text
/// async fn name(req: Request) -> Result<impl IntoResponse, impl Into<BoxError>>
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R, E> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
}

impl<F, Fut, R, E> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Newtype bridging a concrete handler `F` to [`ErasedHandler`].
///
/// Panics raised while building or polling the handler's future are caught
/// here and reported as [`HandlerPanic`] failures.
struct FnHandler<F>(F);

impl<F, Fut, R, E> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = match catch_unwind(AssertUnwindSafe(|| (self.0)(req))) {
            Ok(fut) => fut,
            Err(payload) => {
                let outcome: Outcome = Err(Box::new(HandlerPanic::from_payload(payload)));
                return Box::pin(std::future::ready(outcome));
            }
        };

        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(res)) => Ok(res.into_response()),
                Ok(Err(e)) => Err(e.into()),
                Err(payload) => Err(Box::new(HandlerPanic::from_payload(payload)) as BoxError),
            }
        })
    }
}
