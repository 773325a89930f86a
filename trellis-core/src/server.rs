// HTTP/1.1 front-end: accepts connections and hands requests to a deployment

use crate::chain::Disconnect;
use crate::deployment::Deployment;
use crate::{HttpRequest, HttpResponse, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming as IncomingBody;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use trellis_config::ServerConfig;

/// A bound listener serving one [`Deployment`].
///
/// ```no_run
/// use trellis_core::logging::LogConfig;
/// use trellis_core::{Deployment, Reply, RouteSpec, Server, ServerConfig};
///
/// # async fn run() -> trellis_core::Result<()> {
/// let config = ServerConfig::load()?;
/// let _guard = LogConfig::from_server_config(&config)?.init()?;
///
/// let deployment = Deployment::builder()
///     .route(RouteSpec::get("/health", |_| async { Ok(Reply::text("ok")) }))
///     .build()?;
///
/// Server::bind(deployment, config).await?.serve().await
/// # }
/// ```
pub struct Server {
    listener: TcpListener,
    deployment: Arc<Deployment>,
    config: ServerConfig,
}

impl Server {
    /// Bind the configured address. Port 0 picks a free port.
    pub async fn bind(deployment: impl Into<Arc<Deployment>>, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        Ok(Self {
            listener,
            deployment: deployment.into(),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until ctrl-c.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `signal` resolves, then wait up to the configured
    /// shutdown timeout for open connections to finish.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            deployment,
            config,
        } = self;

        info!(address = %listener.local_addr()?, "Server listening");

        let graceful = GracefulShutdown::new();
        let max_body_size = config.max_body_size;
        tokio::pin!(signal);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(error = %err, "Failed to accept connection");
                            continue;
                        }
                    };
                    debug!(peer = %peer, "Connection accepted");

                    let deployment = deployment.clone();
                    let (closed, disconnect) = Disconnect::channel();
                    let service = service_fn(move |req: Request<IncomingBody>| {
                        let deployment = deployment.clone();
                        let disconnect = disconnect.clone();
                        async move {
                            Ok::<_, Infallible>(
                                handle_request(req, &deployment, disconnect, max_body_size).await,
                            )
                        }
                    });

                    let connection = graceful.watch(
                        http1::Builder::new().serve_connection(TokioIo::new(stream), service),
                    );
                    tokio::spawn(async move {
                        if let Err(err) = connection.await {
                            debug!(peer = %peer, error = %err, "Connection ended with error");
                        }
                        closed.disconnect();
                    });
                }
                _ = &mut signal => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(listener);

        let timeout = Duration::from_secs(config.shutdown_timeout_secs);
        tokio::select! {
            _ = graceful.shutdown() => info!("All connections closed"),
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = config.shutdown_timeout_secs, "Shutdown timed out with open connections");
            }
        }
        Ok(())
    }
}

async fn handle_request(
    req: Request<IncomingBody>,
    deployment: &Deployment,
    disconnect: Disconnect,
    max_body_size: usize,
) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut request = HttpRequest::new(parts.method.as_str(), target);
    for (name, value) in &parts.headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        match request.headers.get_mut(name.as_str()) {
            Some(existing) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => {
                request
                    .headers
                    .insert(name.as_str().to_string(), value.to_string());
            }
        }
    }

    match Limited::new(body, max_body_size).collect().await {
        Ok(collected) => request.body = collected.to_bytes().to_vec(),
        Err(err) => {
            let status = if err.downcast_ref::<LengthLimitError>().is_some() {
                warn!(limit = max_body_size, "Request body too large");
                413
            } else {
                debug!(error = %err, "Failed to read request body");
                400
            };
            return into_hyper(rejection(status));
        }
    }

    let response = match deployment.handle_with(request, disconnect).await {
        Ok(response) => response,
        Err(err) => HttpResponse::new(err.status_code()),
    };
    into_hyper(response)
}

fn rejection(status: u16) -> HttpResponse {
    let reason = crate::HttpStatus::from_code(status)
        .map(|s| s.reason())
        .unwrap_or("Error");
    HttpResponse::new(status)
        .with_json(&serde_json::json!({ "error": reason, "status": status }))
        .unwrap_or_else(|_| HttpResponse::new(status))
}

fn into_hyper(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|err| {
            error!(error = %err, "Response could not be encoded");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_hyper_copies_headers() {
        let response = into_hyper(
            HttpResponse::new(405)
                .with_header("Allow", "GET, HEAD, OPTIONS")
                .with_body("no"),
        );
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()["allow"], "GET, HEAD, OPTIONS");
    }

    #[test]
    fn test_invalid_header_falls_back_to_500() {
        let response = into_hyper(HttpResponse::ok().with_header("X-Bad", "line\nbreak"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rejection_body() {
        let response = rejection(413);
        assert_eq!(response.status, 413);
        assert_eq!(
            response.body_str(),
            Some(r#"{"error":"Payload Too Large","status":413}"#)
        );
    }
}
