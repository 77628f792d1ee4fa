//! HTTP server and graceful shutdown.
//!
//! Every request is collected, tagged with the peer address, and run through
//! the [`Pipeline`]. The peer address is what the rate limiter partitions on.
//!
//! Bodies are capped at [`Server::max_body_bytes`]. A declared
//! `Content-Length` over the cap is answered with `413` before any of the
//! body is read; a streamed body stops being read once it crosses the cap.
//!
//! SIGTERM or Ctrl-C stops the accept loop at once. Connections already
//! accepted are drained before [`Server::serve`] returns, so queued rate
//! limit waiters still get their answer.

use std::net::SocketAddr;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::error::{BoxError, Error};
use crate::pipeline::Pipeline;
use crate::request::Request;
use crate::response::Response;

const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    max_body_bytes: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use tollgate::Server;
    /// let server = Server::bind("0.0.0.0:3000")?;
    /// # Ok::<(), tollgate::Error>(())
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse().map_err(|source| Error::Addr { addr: addr.to_owned(), source })?;
        Ok(Self { addr, max_body_bytes: DEFAULT_MAX_BODY_BYTES })
    }

    /// Largest request body accepted, in bytes. Defaults to 1 MiB.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Starts accepting connections and dispatching them through `pipeline`.
    ///
    /// Returns only after a full graceful shutdown.
    pub async fn serve(self, pipeline: Pipeline) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, max_body_bytes = self.max_body_bytes, "tollgate listening");
        let limit = self.max_body_bytes;

        let mut connections = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(open = connections.len(), "shutting down, draining open connections");
                    break;
                }

                res = listener.accept() => {
                    let Ok((stream, peer)) = res.inspect_err(|e| warn!(error = %e, "accept failed")) else {
                        continue;
                    };

                    connections.spawn(serve_connection(pipeline.clone(), stream, peer, limit));
                }

                // Reap finished connections.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        while connections.join_next().await.is_some() {}

        info!("tollgate stopped");
        Ok(())
    }
}

// ── Connections ───────────────────────────────────────────────────────────────

/// Serves every request on one accepted connection (HTTP/1.1 or HTTP/2).
async fn serve_connection(pipeline: Pipeline, stream: TcpStream, peer: SocketAddr, limit: usize) {
    let svc = service_fn(move |req| dispatch(pipeline.clone(), req, peer, limit));
    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), svc)
        .await
    {
        error!(%peer, error = %e, "connection failed");
    }
}

/// Buffers the body, tags the request with its peer and runs the pipeline.
/// Infallible towards hyper.
async fn dispatch(
    pipeline: Pipeline,
    req: hyper::Request<hyper::body::Incoming>,
    peer: SocketAddr,
    limit: usize,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();

    let body = match read_body(body, limit).await {
        Ok(body) => body,
        Err(res) => {
            warn!(%peer, path = %parts.uri.path(), status = res.status_code().as_u16(), "request body rejected");
            return Ok(res.into_inner());
        }
    };

    let request = Request::from_parts(parts, body, Some(peer));
    Ok(pipeline.handle(request).await.into_inner())
}

/// Reads at most `limit` bytes of `body`.
///
/// Fails with `413` when the body is, or declares itself, larger than
/// `limit`, and with `400` when the body cannot be read.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, Response>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    if body.size_hint().lower() > limit as u64 {
        return Err(payload_too_large());
    }
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(payload_too_large()),
        Err(e) => {
            warn!(error = %e, "could not read request body");
            Err(Response::status(StatusCode::BAD_REQUEST))
        }
    }
}

fn payload_too_large() -> Response {
    Response::json_value(
        StatusCode::PAYLOAD_TOO_LARGE,
        &serde_json::json!({ "error": "Payload Too Large" }),
    )
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Completes on Ctrl-C, or SIGTERM on Unix. A signal whose handler fails to
/// install is logged and then ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
