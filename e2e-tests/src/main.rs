//! Mock app exposing an expvar-style `/debug/vars` endpoint.

use hyper::{
    body::Incoming, header, server::conn::http1, service::service_fn, Request, Response,
    StatusCode,
};
use hyper_util::rt::TokioIo;
use rand::{rng, Rng};
use serde_json::json;
use tokio::{net::TcpListener, sync::watch};

use std::{
    convert::Infallible,
    env,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Generates a snapshot containing values of all shapes handled by the exporter.
fn generate_snapshot(request_count: u64) -> serde_json::Value {
    let mut rng = rng();
    json!({
        "cmdline": ["mock-app", "--verbose"],
        "memstats": {
            "Alloc": rng.random_range(1_000..1_000_000),
            "NumGC": rng.random_range(0..100),
        },
        "requests": request_count,
        "goroutines": rng.random_range(1..100),
        "db.pool:open": rng.random_range(0..10),
        "t_succ_rpc_latency": {
            "p50": rng.random_range(0.0..0.001),
            "p90": rng.random_range(0.001..0.002),
            "p99": rng.random_range(0.002..0.004),
            "count": request_count,
        },
        "other_bucket": { "p50": 1.0 },
        "version": "0.1.0",
    })
}

fn respond(request: &Request<Incoming>, request_count: &AtomicU64) -> Response<String> {
    if request.uri().path() != "/debug/vars" {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(String::new())
            .unwrap();
    }

    let request_count = request_count.fetch_add(1, Ordering::Relaxed) + 1;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(generate_snapshot(request_count).to_string())
        .unwrap()
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let bind_address = env::args()
        .nth(1)
        .expect("Bind address must be provided as first command-line arg");
    let bind_address: SocketAddr = bind_address.parse().expect("Bind address is invalid");

    let (stop_sender, mut stop_receiver) = watch::channel(());
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        stop_sender.send_replace(());
    });

    let listener = TcpListener::bind(bind_address)
        .await
        .unwrap_or_else(|err| panic!("Failed binding to `{bind_address}`: {err}"));
    println!("local_addr={}", listener.local_addr().unwrap());
    // ^ Print the local server address so that it can be used in integration tests

    let request_count = Arc::new(AtomicU64::new(0));
    loop {
        let stream = tokio::select! {
            res = listener.accept() => res.expect("Failed accepting connection").0,
            _ = stop_receiver.changed() => break,
        };

        let request_count = request_count.clone();
        tokio::spawn(async move {
            let service = service_fn(move |request| {
                let response = respond(&request, &request_count);
                async move { Ok::<_, Infallible>(response) }
            });
            http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
                .ok();
        });
    }
}
