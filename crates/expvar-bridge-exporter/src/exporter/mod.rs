//! `MetricsExporter` and closely related types.

use expvar_bridge::{Bridge, Format, MetricRegistry};
use hyper::{
    header, server::conn::http1, service::service_fn, Method, Request, Response, StatusCode, Uri,
};
use hyper_util::rt::TokioIo;
use tokio::{io, net::TcpListener, sync::watch};

use std::{
    convert::Infallible,
    fmt,
    future::{self, Future},
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    time::Instant,
};

use crate::{
    config::{ConfigError, ExporterConfig},
    source::SourceClient,
};

#[cfg(test)]
mod tests;

/// Path of the exposition endpoint.
pub const METRICS_PATH: &str = "/metrics";

#[derive(Debug, Clone)]
struct ScrapeHandler {
    bridge: Bridge,
    source: SourceClient,
    metrics_enabled: bool,
}

impl ScrapeHandler {
    async fn handle<B>(&self, request: Request<B>) -> Response<String> {
        if !self.metrics_enabled || request.uri().path() != METRICS_PATH {
            return text_response(StatusCode::NOT_FOUND, "Not found");
        }
        if request.method() != Method::GET {
            let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
            response
                .headers_mut()
                .insert(header::ALLOW, header::HeaderValue::from_static("GET"));
            return response;
        }

        let accept = request
            .headers()
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok());
        self.scrape(Format::negotiate(accept)).await
    }

    async fn scrape(&self, format: Format) -> Response<String> {
        let started_at = Instant::now();
        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::error!(
                    %err,
                    source = %self.source.uri(),
                    "Error fetching JSON snapshot"
                );
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch data");
            }
        };

        let summary = match self.bridge.update(&snapshot) {
            Ok(summary) => summary,
            Err(err) => {
                tracing::error!(
                    %err,
                    source = %self.source.uri(),
                    "Error converting JSON snapshot to metrics"
                );
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to convert data");
            }
        };

        let body = self.render_body(format);
        let latency = started_at.elapsed();
        let scraped_size = body.len();
        tracing::debug!(
            latency_sec = latency.as_secs_f64(),
            scraped_size,
            ?summary,
            "Scraped metrics in {latency:?} (scraped size: {scraped_size}B)"
        );

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, format.content_type())
            .body(body)
            .unwrap()
    }

    fn render_body(&self, format: Format) -> String {
        let mut buffer = String::with_capacity(1_024);
        self.bridge.registry().encode(&mut buffer, format).unwrap();
        // ^ `unwrap()` is safe; writing to a string never fails.
        buffer
    }
}

fn text_response(status: StatusCode, message: &str) -> Response<String> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(format!("{message}\n"))
        .unwrap()
}

/// Metrics exporter converting snapshots of a JSON debug endpoint to Prometheus metrics.
///
/// On each `GET /metrics` request, the exporter fetches a snapshot from the source endpoint,
/// applies it to the [`MetricRegistry`] and renders all metrics in the registry. If the snapshot
/// cannot be fetched, the request fails with a 500 status, and the registry is not modified.
///
/// # Examples
///
/// See crate-level docs for the examples of usage.
pub struct MetricsExporter<'a> {
    inner: ScrapeHandler,
    shutdown_future: Pin<Box<dyn Future<Output = ()> + Send + 'a>>,
}

impl fmt::Debug for MetricsExporter<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MetricsExporter")
            .field("source", self.inner.source.uri())
            .field("registry", self.inner.bridge.registry())
            .field("metrics_enabled", &self.inner.metrics_enabled)
            .finish_non_exhaustive()
    }
}

impl<'a> MetricsExporter<'a> {
    /// Creates an exporter fetching snapshots from `source_uri` and writing converted metrics
    /// to the provided `registry`. Note that the registry is in `Arc`, meaning it can be used
    /// elsewhere (e.g., to export data in another format). The `/metrics` route is enabled.
    pub fn new(registry: Arc<MetricRegistry>, source_uri: Uri) -> Self {
        tracing::info!("Created metrics exporter for JSON endpoint `{source_uri}`");
        Self {
            inner: ScrapeHandler {
                bridge: Bridge::new(registry),
                source: SourceClient::new(source_uri),
                metrics_enabled: true,
            },
            shutdown_future: Box::pin(future::pending()),
        }
    }

    /// Creates an exporter with a new empty registry based on the provided `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source URI cannot be constructed.
    pub fn from_config(config: &ExporterConfig) -> Result<Self, ConfigError> {
        let source_uri = config.source_uri()?;
        Ok(Self::new(Arc::default(), source_uri).with_metrics_enabled(config.metrics_enabled))
    }

    /// Returns the registry this exporter writes to.
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        self.inner.bridge.registry()
    }

    /// Enables or disables the `/metrics` route. If the route is disabled, all requests
    /// are responded to with 404.
    #[must_use]
    pub fn with_metrics_enabled(mut self, enabled: bool) -> Self {
        self.inner.metrics_enabled = enabled;
        self
    }

    /// Configures graceful shutdown for the exporter server.
    #[must_use]
    pub fn with_graceful_shutdown<F>(mut self, shutdown: F) -> Self
    where
        F: Future<Output = ()> + Send + 'a,
    {
        self.shutdown_future = Box::pin(shutdown);
        self
    }

    /// Starts the server on the specified address. This future resolves when the server is shut down.
    ///
    /// The server will expose the following endpoints:
    ///
    /// - `GET /metrics`: fetches a snapshot and serves all metrics in the text format negotiated
    ///   using the `Accept` header (OpenMetrics or Prometheus). Only served if the route is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the specified address fails.
    pub async fn start(self, bind_address: SocketAddr) -> io::Result<()> {
        tracing::info!("Starting Prometheus exporter web server on {bind_address}");
        self.bind(bind_address).await?.start().await?;
        tracing::info!("Prometheus metrics exporter server shut down");
        Ok(())
    }

    /// Creates an HTTP exporter server and binds it to the specified address.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the specified address fails.
    pub async fn bind(mut self, bind_address: SocketAddr) -> io::Result<MetricsServer<'a>> {
        if !self.inner.metrics_enabled {
            tracing::warn!(
                "`{METRICS_PATH}` route is disabled; the exporter server will respond with 404 to all requests"
            );
        }

        let listener = TcpListener::bind(bind_address).await?;
        let local_addr = listener.local_addr()?;
        let server = async move {
            let (started_shutdown_sender, started_shutdown) = watch::channel(());
            loop {
                let stream = tokio::select! {
                    res = listener.accept() => res?.0,
                    () = &mut self.shutdown_future => break,
                };

                let io = TokioIo::new(stream);
                let inner = self.inner.clone();
                let mut started_shutdown = started_shutdown.clone();
                tokio::spawn(async move {
                    let service = service_fn(|request| {
                        let inner = inner.clone();
                        async move { Ok::<_, Infallible>(inner.handle(request).await) }
                    });
                    let conn = http1::Builder::new().serve_connection(io, service);
                    tokio::pin!(conn);

                    let res = tokio::select! {
                        _ = started_shutdown.changed() => {
                            conn.as_mut().graceful_shutdown();
                            conn.await
                        }
                        res = conn.as_mut() => res,
                    };
                    if let Err(err) = res {
                        tracing::warn!(%err, "Error serving connection");
                    }
                });
            }

            tracing::info!("Stop signal received, Prometheus metrics exporter is shutting down");
            // Send the graceful shutdown signal to all alive connections.
            drop(started_shutdown);
            started_shutdown_sender.send_replace(());
            // Wait until all connections are dropped.
            started_shutdown_sender.closed().await;

            Ok(())
        };

        Ok(MetricsServer {
            server: Box::pin(server),
            local_addr,
        })
    }
}

/// Metrics server bound to a certain local address returned by [`MetricsExporter::bind()`].
///
/// Useful e.g. if you need to find out which port the server was bound to if the 0th port was specified.
#[must_use = "Server should be `start()`ed"]
pub struct MetricsServer<'a> {
    server: Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>,
    local_addr: SocketAddr,
}

impl fmt::Debug for MetricsServer<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MetricsServer")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl MetricsServer<'_> {
    /// Returns the local address this server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts this server. Resolves once the server is shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if starting the server operation fails.
    pub async fn start(self) -> io::Result<()> {
        self.server.await
    }
}
