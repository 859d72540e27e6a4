//! Tests for metrics exporter.

use assert_matches::assert_matches;
use expvar_bridge::{Instrument, InstrumentKind};
use http_body_util::{BodyExt as _, Empty};
use hyper::body::{Bytes, Incoming};
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use tokio::sync::oneshot;
use tracing::subscriber::Subscriber;
use tracing_capture::{CaptureLayer, SharedStorage};
use tracing_subscriber::layer::SubscriberExt;

use std::{net::Ipv4Addr, sync::Mutex, time::Duration};

use super::*;

const TEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Mock of the source app serving `/debug/vars`.
#[derive(Debug, Clone)]
struct MockSource {
    response: Arc<Mutex<(StatusCode, String)>>,
}

impl MockSource {
    fn new(body: serde_json::Value) -> Self {
        Self {
            response: Arc::new(Mutex::new((StatusCode::OK, body.to_string()))),
        }
    }

    fn set_response(&self, status: StatusCode, body: impl Into<String>) {
        *self.response.lock().unwrap() = (status, body.into());
    }

    fn response(&self) -> Response<String> {
        let (status, body) = self.response.lock().unwrap().clone();
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap()
    }

    async fn spawn(&self) -> Uri {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let local_addr = listener.local_addr().unwrap();
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let this = this.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |request: Request<Incoming>| {
                        let this = this.clone();
                        async move {
                            assert_eq!(request.uri().path(), "/debug/vars");
                            Ok::<_, Infallible>(this.response())
                        }
                    });
                    http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                        .ok();
                });
            }
        });
        format!("http://{local_addr}/debug/vars").parse().unwrap()
    }
}

/// Returns a URI at which no server is listening.
async fn unreachable_uri() -> Uri {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let local_addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{local_addr}/debug/vars").parse().unwrap()
}

fn metrics_request() -> Request<()> {
    Request::builder().uri(METRICS_PATH).body(()).unwrap()
}

fn encode(registry: &MetricRegistry) -> String {
    let mut buffer = String::new();
    registry.encode(&mut buffer, Format::OpenMetrics).unwrap();
    buffer
}

fn tracing_subscriber(storage: &SharedStorage) -> impl Subscriber {
    tracing_subscriber::fmt()
        .pretty()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .finish()
        .with(CaptureLayer::new(storage))
}

#[tokio::test]
async fn scraping_converts_snapshot() {
    let source = MockSource::new(serde_json::json!({
        "req_count": 42.0,
        "t_succ_latency": { "p50": 0.001, "p90": 0.002, "p99": 0.003, "ignored_field": 1 },
        "other_bucket": { "p50": 1.0 },
        "cmdline": ["/usr/bin/app"],
    }));
    let exporter = MetricsExporter::new(Arc::default(), source.spawn().await);

    let response = exporter.inner.handle(metrics_request()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        Format::PROMETHEUS_CONTENT_TYPE
    );
    let body = response.into_body();
    let lines: Vec<_> = body.lines().collect();
    let expected_lines = [
        "# TYPE req_count gauge",
        "req_count 42.0",
        "# TYPE t_succ_latency histogram",
        "t_succ_latency_count 3",
        "t_succ_latency_bucket{le=\"+Inf\"} 3",
    ];
    for line in expected_lines {
        assert!(lines.contains(&line), "{lines:#?}");
    }
    assert!(!lines.contains(&"# EOF"), "{lines:#?}");
    assert!(!body.contains("other_bucket"), "{body}");
    assert_eq!(exporter.registry().names(), ["req_count", "t_succ_latency"]);

    // Metrics accumulate across scrapes.
    source.set_response(StatusCode::OK, r#"{ "req_count": 50, "new_gauge": 1 }"#);
    let response = exporter.inner.handle(metrics_request()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body();
    let lines: Vec<_> = body.lines().collect();
    assert!(lines.contains(&"req_count 50.0"), "{lines:#?}");
    assert!(lines.contains(&"new_gauge 1.0"), "{lines:#?}");
    assert!(lines.contains(&"t_succ_latency_count 3"), "{lines:#?}");
    assert_eq!(exporter.registry().len(), 3);
}

#[tokio::test]
async fn negotiating_open_metrics_format() {
    let source = MockSource::new(serde_json::json!({ "goroutines": 5 }));
    let exporter = MetricsExporter::new(Arc::default(), source.spawn().await);

    let request = Request::builder()
        .uri(METRICS_PATH)
        .header(
            header::ACCEPT,
            "application/openmetrics-text;version=1.0.0,text/plain;version=0.0.4;q=0.5",
        )
        .body(())
        .unwrap();
    let response = exporter.inner.handle(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        Format::OPEN_METRICS_CONTENT_TYPE
    );
    let body = response.into_body();
    assert!(body.contains("goroutines 5.0"), "{body}");
    assert!(body.ends_with("# EOF\n"), "{body}");
}

#[tokio::test]
async fn fetch_failure_leaves_registry_unchanged() {
    let tracing_storage = SharedStorage::default();
    let _subscriber_guard = tracing::subscriber::set_default(tracing_subscriber(&tracing_storage));
    // ^ **NB.** `set_default()` only works because tests use a single-threaded Tokio runtime

    let registry = Arc::new(MetricRegistry::new());
    registry
        .ensure("existing", InstrumentKind::Scalar)
        .unwrap()
        .as_scalar()
        .unwrap()
        .set(1.0);
    let encoded_before = encode(&registry);

    let source_uri = unreachable_uri().await;
    let exporter = MetricsExporter::new(registry.clone(), source_uri.clone());
    let response = exporter.inner.handle(metrics_request()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.into_body(), "Failed to fetch data\n");
    assert_eq!(encode(&registry), encoded_before);

    let storage = tracing_storage.lock();
    let errors: Vec<_> = storage
        .all_events()
        .filter(|event| {
            event
                .metadata()
                .target()
                .starts_with(env!("CARGO_CRATE_NAME"))
                && *event.metadata().level() == tracing::Level::ERROR
        })
        .collect();
    assert_eq!(errors.len(), 1);
    let error = &errors[0];
    assert!(error
        .message()
        .unwrap()
        .contains("Error fetching JSON snapshot"));
    assert_eq!(
        error["source"].as_debug_str().unwrap(),
        source_uri.to_string()
    );
}

#[tokio::test]
async fn erroneous_source_responses() {
    let source = MockSource::new(serde_json::json!({ "a": 1 }));
    let exporter = MetricsExporter::new(Arc::default(), source.spawn().await);

    let bogus_responses = [
        (StatusCode::OK, "not JSON"),
        (StatusCode::OK, "[1, 2, 3]"),
        (StatusCode::SERVICE_UNAVAILABLE, r#"{ "a": 1 }"#),
    ];
    for (status, body) in bogus_responses {
        source.set_response(status, body);
        let response = exporter.inner.handle(metrics_request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{body}");
        assert!(exporter.registry().is_empty());
    }

    let err = exporter.inner.source.fetch().await.unwrap_err();
    assert_matches!(err, crate::FetchError::Status(StatusCode::SERVICE_UNAVAILABLE));
    source.set_response(StatusCode::OK, "{");
    let err = exporter.inner.source.fetch().await.unwrap_err();
    assert_matches!(err, crate::FetchError::Json(_));
}

#[tokio::test]
async fn conversion_failure_is_server_error() {
    let source = MockSource::new(serde_json::json!({ "t_succ.x": 1, "t_succ:x": { "p50": 0.1 } }));
    let exporter = MetricsExporter::new(Arc::default(), source.spawn().await);

    let response = exporter.inner.handle(metrics_request()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.into_body(), "Failed to convert data\n");
    assert!(exporter.registry().is_empty());
}

#[tokio::test]
async fn routing() {
    let source = MockSource::new(serde_json::json!({ "a": 1 }));
    let source_uri = source.spawn().await;
    let exporter = MetricsExporter::new(Arc::default(), source_uri.clone());

    let request = Request::builder().uri("/other").body(()).unwrap();
    let response = exporter.inner.handle(request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method(Method::POST)
        .uri(METRICS_PATH)
        .body(())
        .unwrap();
    let response = exporter.inner.handle(request).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET");
    assert!(exporter.registry().is_empty());

    let exporter = MetricsExporter::new(Arc::default(), source_uri).with_metrics_enabled(false);
    let response = exporter.inner.handle(metrics_request()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(exporter.registry().is_empty());
}

#[tokio::test]
async fn concurrent_scrapes_create_single_instrument() {
    let source = MockSource::new(serde_json::json!({
        "brand_new": 1,
        "t_succ_brand_new": { "p99": 0.002 },
    }));
    let exporter = MetricsExporter::new(Arc::default(), source.spawn().await);

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let inner = exporter.inner.clone();
            tokio::spawn(async move { inner.handle(metrics_request()).await.status() })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(exporter.registry().names(), ["brand_new", "t_succ_brand_new"]);
    let instrument = exporter.registry().get("t_succ_brand_new").unwrap();
    assert_matches!(instrument, Instrument::Distribution(_));
    let encoded = encode(exporter.registry());
    assert!(encoded.contains("t_succ_brand_new_count 10"), "{encoded}");
}

#[tokio::test]
async fn serving_metrics_over_http() {
    let source = MockSource::new(serde_json::json!({ "uptime_sec": 3600 }));
    let (stop_sender, stop_receiver) = oneshot::channel::<()>();
    let exporter = MetricsExporter::new(Arc::default(), source.spawn().await)
        .with_graceful_shutdown(async move {
            stop_receiver.await.ok();
        });
    let registry = exporter.registry().clone();

    let server = exporter.bind((Ipv4Addr::LOCALHOST, 0).into()).await.unwrap();
    let local_addr = server.local_addr();
    let server_task = tokio::spawn(server.start());

    let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
    let uri: Uri = format!("http://{local_addr}{METRICS_PATH}").parse().unwrap();
    let response = tokio::time::timeout(TEST_TIMEOUT, client.get(uri))
        .await
        .expect("timed out waiting for response")
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("uptime_sec 3600.0"), "{body}");
    assert_eq!(registry.len(), 1);

    drop(client);
    stop_sender.send(()).unwrap();
    tokio::time::timeout(TEST_TIMEOUT, server_task)
        .await
        .expect("timed out waiting for server shutdown")
        .unwrap()
        .unwrap();
}
