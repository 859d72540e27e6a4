//! Standalone exporter serving `/metrics` converted from an app's `/debug/vars` endpoint.
//!
//! Configured with environment variables; see [`ExporterConfig`] for details.

use expvar_bridge_exporter::{ExporterConfig, MetricsExporter};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use std::{fmt, process};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Logs the error and exits the process with a non-zero code.
fn exit_on_error<T, E: fmt::Display>(result: Result<T, E>, message: &str) -> T {
    result.unwrap_or_else(|err| {
        tracing::error!(%err, "{message}");
        process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    init_logging();

    let config = exit_on_error(ExporterConfig::from_env(), "Invalid exporter configuration");
    tracing::info!(?config, "Loaded exporter configuration");

    let (stop_sender, mut stop_receiver) = watch::channel(());
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        stop_sender.send_replace(());
    });

    let exporter = exit_on_error(
        MetricsExporter::from_config(&config),
        "Invalid exporter configuration",
    );
    let exporter = exporter.with_graceful_shutdown(async move {
        stop_receiver.changed().await.ok();
    });
    let bind_address = config.bind_address;
    let server = exit_on_error(
        exporter.bind(bind_address).await,
        &format!("Failed binding to `{bind_address}`"),
    );
    println!("local_addr={}", server.local_addr());
    // ^ Print the local server address so that it can be used by supervising processes

    exit_on_error(server.start().await, "Metrics exporter server failed");
}
