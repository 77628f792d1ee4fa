//! Bearer token authentication stage.

use http::StatusCode;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::HeaderValue;
use serde_json::json;

use crate::handler::{BoxFuture, Outcome};
use crate::middleware::{Interceptor, Next};
use crate::request::Request;
use crate::response::Response;
use crate::token::TokenValidator;

/// Rejects requests without a currently valid bearer token.
///
/// # Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// Returns `401 Unauthorized` with `{"error":"Unauthorized"}` and
/// `WWW-Authenticate: Bearer` (RFC 6750) when the header is missing,
/// malformed, undecodable, or expired. Nothing downstream runs in that case.
/// Accepted requests are passed on unchanged.
///
/// See [`TokenValidator`] for what "valid" does and does not cover.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authentication {
    validator: TokenValidator,
}

impl Authentication {
    pub fn new(validator: TokenValidator) -> Self {
        Self { validator }
    }
}

impl Interceptor for Authentication {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let validation = self.validator.validate(req.header(AUTHORIZATION.as_str()));
        if validation.valid {
            return next.run(req);
        }

        tracing::debug!(
            method = %req.method(),
            path = %req.path(),
            expiry = ?validation.expiry,
            "rejecting unauthenticated request"
        );
        let outcome: Outcome = Ok(unauthorized());
        Box::pin(std::future::ready(outcome))
    }
}

fn unauthorized() -> Response {
    let mut res = Response::json_value(StatusCode::UNAUTHORIZED, &json!({ "error": "Unauthorized" }));
    res.headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    res
}
