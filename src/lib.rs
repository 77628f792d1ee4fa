//! # tollgate
//!
//! An ordered request-interceptor pipeline for small JSON APIs.
//!
//! ## The chain
//!
//! ```text
//! request → ErrorTranslation → RateLimit → Authentication → AccessLog → handler
//! ```
//!
//! - **ErrorTranslation** (outermost) — handler failures become a `500` JSON
//!   envelope, bodiless `404`s become a not-found envelope.
//! - **RateLimit** — fixed window per client IP with a bounded FIFO queue;
//!   overflow gets `429`. Runs before auth so floods are cheap to turn away.
//! - **Authentication** — `Authorization: Bearer <jwt>` must decode and be
//!   unexpired, otherwise `401`. Signatures are *not* verified.
//! - **AccessLog** — entry and exit events with elapsed milliseconds.
//!
//! Each stage either answers the request itself or delegates exactly once.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tollgate::{MemoryStore, Pipeline, RateLimitOptions, RateLimiter, Router, Server, TokenValidator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tollgate::Error> {
//!     let store = Arc::new(MemoryStore::seeded());
//!     let app = tollgate::users::routes(Router::new(), store);
//!
//!     let limiter = Arc::new(RateLimiter::new(RateLimitOptions::default()));
//!     let pipeline = Pipeline::new(limiter, TokenValidator::new(), app.into_handler());
//!
//!     Server::bind("0.0.0.0:3000")?.serve(pipeline).await
//! }
//! ```

mod error;
mod handler;
mod pipeline;
mod request;
mod response;
mod router;
mod server;

pub mod clock;
pub mod config;
pub mod limiter;
pub mod middleware;
pub mod store;
pub mod telemetry;
pub mod token;
pub mod users;

pub use config::Config;
pub use error::{BoxError, Error, HandlerPanic};
pub use handler::{BoxFuture, Handler, Outcome};
pub use limiter::{Admission, RateLimitOptions, RateLimiter, Waiter};
pub use middleware::{Interceptor, Next};
pub use pipeline::Pipeline;
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use store::{MemoryStore, RecordStore, StoreError, User};
pub use token::{TokenValidator, Validation};
