//! Pull-based exposition endpoint
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::error::{ExporterError, Result};
use crate::metrics::MetricRegistry;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Bind `addr` and serve the registry from a background task. Binding
/// happens before returning so a taken port fails startup.
pub async fn serve(addr: SocketAddr, metrics: Arc<MetricRegistry>) -> Result<JoinHandle<()>> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ExporterError::Http(format!("failed to bind {}: {}", addr, e)))?;
    let local = listener.local_addr()?;
    info!("Starting HTTP Server on {}", local);

    Ok(tokio::spawn(accept_loop(listener, metrics)))
}

/// Wait on the task returned by [`serve`]. The accept loop never finishes on
/// its own, so any return is a failure.
pub async fn wait(handle: JoinHandle<()>) -> ExporterError {
    let err = match handle.await {
        Err(e) if e.is_panic() => ExporterError::Http("metrics server panicked".to_string()),
        Err(e) => ExporterError::Http(format!("metrics server stopped: {}", e)),
        Ok(()) => ExporterError::Http("metrics server stopped".to_string()),
    };
    error!("{}", err);
    err
}

async fn accept_loop(listener: TcpListener, metrics: Arc<MetricRegistry>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("Scrape connection from {}", peer);
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, metrics).await {
                        debug!("Metrics connection error: {}", e);
                    }
                });
            }
            Err(e) => error!("Metrics accept error: {}", e),
        }
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    metrics: Arc<MetricRegistry>,
) -> std::result::Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let metrics = Arc::clone(&metrics);
        async move { Ok::<_, hyper::Error>(handle_request(&req, &metrics)) }
    });
    http1::Builder::new().serve_connection(io, service).await
}

fn handle_request<B>(req: &Request<B>, metrics: &MetricRegistry) -> Response<Full<Bytes>> {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }
    match req.uri().path() {
        "/" | "/metrics" => match metrics.render() {
            Ok(body) => Response::builder()
                .status(StatusCode::OK)
                .header("content-type", CONTENT_TYPE)
                .body(Full::new(Bytes::from(body)))
                .unwrap_or_else(|_| plain(StatusCode::INTERNAL_SERVER_ERROR, "bad response")),
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                plain(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
            }
        },
        _ => plain(StatusCode::NOT_FOUND, "not found"),
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
