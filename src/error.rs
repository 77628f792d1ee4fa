//! Unified error types.

use std::any::Any;

/// The failure signal passed between pipeline stages.
///
/// Handlers return it for anything they cannot turn into a response
/// themselves. It travels outward untouched until the error interceptor
/// converts it into a `500` envelope.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by tollgate's fallible infrastructure operations.
///
/// Application-level outcomes (401, 404, 429, etc.) are expressed as
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// failures around the pipeline: binding to a port or loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address `{addr}`: {source}")]
    Addr {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// A handler panicked while producing its response.
///
/// Panics are caught at the handler boundary and surfaced as ordinary
/// failures so every outer stage observes them the same way.
#[derive(Debug, thiserror::Error)]
#[error("handler panicked: {message}")]
pub struct HandlerPanic {
    message: String,
}

impl HandlerPanic {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
