//! Metrics exposition server
//!
//! A minimal HTTP/1.1 responder that renders the [`MetricRegistry`] on every
//! scrape. Rendering only takes the registry's read guard, so scrapes never
//! wait on the FIFO.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::metrics::MetricRegistry;

/// Pull-based exposition endpoint.
pub struct MetricsServer {
    listener: TcpListener,
    registry: Arc<MetricRegistry>,
}

impl MetricsServer {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr, registry: Arc<MetricRegistry>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Server(format!("Failed to bind metrics server on {}: {}", addr, e)))?;

        Ok(Self { listener, registry })
    }

    /// Address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept scrapes until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        info!("Metrics server listening on {}", addr);

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => None,
                accepted = self.listener.accept() => Some(accepted),
            };

            let (stream, peer) = match accepted {
                None => {
                    info!("Metrics server on {} stopped", addr);
                    return Ok(());
                }
                Some(Ok(conn)) => conn,
                Some(Err(e)) => {
                    return Err(Error::Server(format!("Metrics server accept error: {}", e)));
                }
            };

            debug!(%peer, "Accepted scrape connection");
            let io = TokioIo::new(stream);
            let registry = Arc::clone(&self.registry);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let registry = Arc::clone(&registry);
                    async move { Ok::<_, Infallible>(respond(&registry, &req)) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Metrics server connection error: {}", e);
                }
            });
        }
    }
}

/// Route a single request.
fn respond<B>(registry: &MetricRegistry, req: &Request<B>) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/" | "/metrics" => match registry.encode() {
            Ok(buffer) => {
                let mut response = text_response(StatusCode::OK, Bytes::from(buffer));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(registry.content_type()),
                );
                response
            }
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Bytes::from_static(b"failed to encode metrics"),
                )
            }
        },
        "/healthz" => text_response(StatusCode::OK, Bytes::from_static(b"ok")),
        _ => text_response(StatusCode::NOT_FOUND, Bytes::from_static(b"not found")),
    }
}

fn text_response(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
}
