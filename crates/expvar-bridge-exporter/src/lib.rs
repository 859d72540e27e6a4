//! Metric exporter converting an expvar-style JSON endpoint into Prometheus metrics.
//!
//! On each scrape of `GET /metrics`, the exporter fetches a JSON snapshot from
//! `http://<source>/debug/vars`, converts it using [`expvar_bridge`] and serves all metrics
//! accumulated so far. See the `expvar_bridge` docs for conversion rules.
//!
//! # Examples
//!
//! ```no_run
//! use expvar_bridge_exporter::{ExporterConfig, MetricsExporter};
//! use tokio::sync::watch;
//!
//! # async fn test() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExporterConfig::from_env()?;
//! let (stop_sender, mut stop_receiver) = watch::channel(false);
//! let exporter = MetricsExporter::from_config(&config)?
//!     .with_graceful_shutdown(async move {
//!         stop_receiver.changed().await.ok();
//!     });
//! let server = exporter.bind(config.bind_address).await?;
//! println!("Serving metrics on {}", server.local_addr());
//! tokio::spawn(server.start());
//! // Then, e.g., stop the server once the app receives a signal:
//! stop_sender.send_replace(true);
//! # Ok(())
//! # }
//! ```

// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

pub use crate::{
    config::{ConfigError, ExporterConfig},
    exporter::{MetricsExporter, MetricsServer, METRICS_PATH},
    source::FetchError,
};

mod config;
mod exporter;
mod source;

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
