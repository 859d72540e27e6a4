//! Conversion of expvar-style JSON snapshots into Prometheus metrics based on
//! the `prometheus-client` crate.
//!
//! # Overview
//!
//! - A [`Snapshot`] is a JSON object produced by an app's debug endpoint (e.g., `/debug/vars`).
//! - Each snapshot key is [sanitized](sanitize()) into a metric name, and its value is
//!   [classified](classify()) into a [`ValueShape`]: a scalar, a distribution of pre-computed
//!   quantiles, or an ignored value.
//! - A [`MetricRegistry`] lazily creates an [`Instrument`] per metric name on first sight.
//!   Scalars are exported as gauges; distributions are exported as histograms with
//!   [fixed buckets](Buckets::DISTRIBUTION). Instruments are never removed.
//! - A [`Bridge`] ties these steps together for a whole snapshot. The registry can then be
//!   [encoded](MetricRegistry::encode()) in the OpenMetrics or Prometheus text [`Format`].
//!
//! # Examples
//!
//! ```
//! use expvar_bridge::{Bridge, Format, MetricRegistry, Snapshot};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(MetricRegistry::new());
//! let bridge = Bridge::new(registry.clone());
//!
//! let snapshot: Snapshot = serde_json::from_str(r#"{
//!     "req_count": 42,
//!     "t_succ_latency": { "p50": 0.001, "p90": 0.002, "p99": 0.003 },
//!     "cmdline": ["/usr/bin/app"]
//! }"#)?;
//! let summary = bridge.update(&snapshot)?;
//! assert_eq!(summary.created, 2);
//! assert_eq!(summary.observations, 3);
//! assert_eq!(registry.names(), ["req_count", "t_succ_latency"]);
//!
//! let mut buffer = String::new();
//! registry.encode(&mut buffer, Format::Prometheus)?;
//! assert!(buffer.contains("req_count 42.0"));
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

mod bridge;
mod buckets;
mod classify;
mod format;
mod instruments;
mod names;
mod registry;

pub use crate::{
    bridge::{Bridge, Snapshot, UpdateSummary},
    buckets::Buckets,
    classify::{classify, ValueShape, DISTRIBUTION_KEY_PREFIX, QUANTILE_KEYS},
    format::Format,
    instruments::{Distribution, Instrument, InstrumentKind, Scalar},
    names::{sanitize, validate_metric_name, InvalidName},
    registry::{MetricRegistry, RegistryError},
};

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
