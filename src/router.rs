//! Method + path dispatch for the terminal end of a pipeline.
//!
//! Each method gets its own `matchit` tree. Requests that match no
//! route get a bodiless `404`, which the error stage turns into the standard
//! not-found envelope.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxFuture, BoxedHandler, Handler, Outcome};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup and hand it to the pipeline with
/// [`Router::into_handler`]. Each [`Router::on`] call returns `self` so
/// registrations chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Adds `handler` for `method` on `path`.
    ///
    /// `{name}` segments are captured and read back with `req.param("name")`:
    ///
    /// ```rust,no_run
    /// # use tollgate::{Request, Response, Router};
    /// # use http::Method;
    /// # use std::convert::Infallible;
    /// # async fn get_user(_: Request) -> Result<Response, Infallible> { Ok(Response::text("")) }
    /// # async fn delete_user(_: Request) -> Result<Response, Infallible> { Ok(Response::text("")) }
    /// Router::new()
    ///     .on(Method::DELETE, "/api/users/{id}", delete_user)
    ///     .on(Method::GET,    "/api/users/{id}", get_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with an earlier one.
    /// Routes are fixed at startup, so this is a programming error.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Turns the router into a terminal handler for a [`Pipeline`](crate::Pipeline).
    pub fn into_handler(self) -> impl Fn(Request) -> BoxFuture + Send + Sync + 'static {
        let router = Arc::new(self);
        move |req| router.dispatch(req)
    }

    fn dispatch(&self, mut req: Request) -> BoxFuture {
        match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.set_params(params);
                handler.call(req)
            }
            None => {
                let outcome: Outcome = Ok(Response::status(StatusCode::NOT_FOUND));
                Box::pin(std::future::ready(outcome))
            }
        }
    }

    fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
