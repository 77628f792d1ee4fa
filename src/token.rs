//! Bearer credential validation.
//!
//! Tokens are compact JWS strings (`header.payload.signature`). Only the
//! claims are read: the header and payload must decode to JSON objects and
//! the payload must carry an `exp` claim in the future.
//!
//! **The signature is not verified.** Anyone can mint a token that passes
//! this check. It mirrors an expiry-only check for behavioural parity and is
//! not suitable for production authentication.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::clock;

/// Claims read from a token payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry as seconds since the Unix epoch. RFC 7519 allows fractions.
    pub exp: Option<f64>,
    pub sub: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Expiry with millisecond precision.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        let exp = self.exp?;
        if !exp.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis((exp * 1000.0).floor() as i64)
    }
}

/// Result of validating an `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub expiry: Option<DateTime<Utc>>,
}

impl Validation {
    const INVALID: Self = Self { valid: false, expiry: None };
}

#[derive(Debug, thiserror::Error)]
enum TokenError {
    #[error("expected three dot-separated segments")]
    Segments,
    #[error("segment is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("segment is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
}

/// Checks bearer credentials for shape and expiry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenValidator;

impl TokenValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validates a raw `Authorization` header value against the current time.
    pub fn validate(&self, header: Option<&str>) -> Validation {
        self.validate_at(header, clock::now_utc())
    }

    /// Validates a raw `Authorization` header value against `now`.
    ///
    /// The token is whatever follows the first space. Missing, empty or
    /// scheme-less headers, undecodable tokens, and tokens without an `exp`
    /// claim are all simply invalid.
    pub fn validate_at(&self, header: Option<&str>, now: DateTime<Utc>) -> Validation {
        let Some(token) = header.and_then(bearer_token) else {
            return Validation::INVALID;
        };

        let claims = match decode_claims(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "undecodable bearer token");
                return Validation::INVALID;
            }
        };

        match claims.expiry() {
            Some(expiry) => Validation { valid: expiry > now, expiry: Some(expiry) },
            None => Validation::INVALID,
        }
    }
}

/// Extracts the credential after the first space of a header value.
fn bearer_token(header: &str) -> Option<&str> {
    let (_scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(TokenError::Segments);
    };

    let _: Map<String, Value> = serde_json::from_slice(&decode_segment(header)?)?;
    Ok(serde_json::from_slice(&decode_segment(payload)?)?)
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))
}
