//! Error translation — the outermost stage.
//!
//! Two things become uniform JSON envelopes here:
//!
//! | Inner result | Response |
//! |---|---|
//! | `Err(e)` from any inner stage | `500` `{"StatusCode":500,"Message":"An unexpected error occurred.","Details":e}` |
//! | `404` with an empty body | `404` `{"StatusCode":404,"Message":"Resource not found."}` |
//!
//! A `404` that already carries a body is passed through untouched.
//!
//! `Details` exposes the raw failure message. That is convenient while
//! developing and leaks internals in production; strip it before deploying
//! somewhere hostile.

use http::StatusCode;
use serde::Serialize;

use crate::handler::BoxFuture;
use crate::middleware::{Interceptor, Next};
use crate::request::Request;
use crate::response::{ContentType, Response};

const NOT_FOUND_MESSAGE: &str = "Resource not found.";
const INTERNAL_MESSAGE: &str = "An unexpected error occurred.";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope<'a> {
    status_code: u16,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

/// Converts failures and bare 404s into JSON envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorTranslation;

impl ErrorTranslation {
    pub fn new() -> Self {
        Self
    }
}

impl Interceptor for ErrorTranslation {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        Box::pin(async move {
            match next.run(req).await {
                Ok(res) => Ok(translate_not_found(res)),
                Err(e) => {
                    tracing::error!(error = %e, "unhandled failure");
                    Ok(internal_error(&e.to_string()))
                }
            }
        })
    }
}

/// Builds the `500` envelope for a failure message.
pub fn internal_error(details: &str) -> Response {
    Response::json_value(
        StatusCode::INTERNAL_SERVER_ERROR,
        &Envelope {
            status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: INTERNAL_MESSAGE,
            details: Some(details),
        },
    )
}

fn translate_not_found(mut res: Response) -> Response {
    if res.status_code() != StatusCode::NOT_FOUND || !res.body().is_empty() {
        return res;
    }
    let envelope = Envelope {
        status_code: StatusCode::NOT_FOUND.as_u16(),
        message: NOT_FOUND_MESSAGE,
        details: None,
    };
    match serde_json::to_vec(&envelope) {
        Ok(body) => res.replace_body(ContentType::Json, body),
        Err(e) => tracing::error!(error = %e, "failed to serialize 404 envelope"),
    }
    res
}
