//! Instruments backing converted metrics.

use prometheus_client::metrics::{
    gauge::Gauge as GaugeInner, histogram::Histogram as HistogramInner,
};

use std::{fmt, sync::atomic::AtomicU64};

use crate::buckets::Buckets;

/// Kind of an [`Instrument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// [`Scalar`] instrument.
    Scalar,
    /// [`Distribution`] instrument.
    Distribution,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Scalar => "scalar",
            Self::Distribution => "distribution",
        })
    }
}

/// Scalar instrument exported as a gauge.
///
/// Holds the last set value; no history is retained. Clones share the same value.
#[derive(Debug, Clone, Default)]
pub struct Scalar(GaugeInner<f64, AtomicU64>);

impl Scalar {
    /// Sets the value of this instrument, returning the previous value.
    pub fn set(&self, value: f64) -> f64 {
        self.0.set(value)
    }

    /// Gets the current value of the instrument.
    pub fn get(&self) -> f64 {
        self.0.get()
    }
}

/// Distribution instrument exported as a histogram with fixed [`Buckets`].
///
/// Clones share the same observations.
#[derive(Debug, Clone)]
pub struct Distribution(HistogramInner);

impl Distribution {
    pub(crate) fn new(buckets: Buckets) -> Self {
        Self(HistogramInner::new(buckets.iter()))
    }

    /// Observes the specified `value`.
    pub fn observe(&self, value: f64) {
        self.0.observe(value);
    }
}

/// Instrument registered in a [`MetricRegistry`](crate::MetricRegistry).
#[derive(Debug, Clone)]
pub enum Instrument {
    /// Scalar instrument.
    Scalar(Scalar),
    /// Distribution instrument.
    Distribution(Distribution),
}

impl Instrument {
    pub(crate) fn new(kind: InstrumentKind, buckets: Buckets) -> Self {
        match kind {
            InstrumentKind::Scalar => Self::Scalar(Scalar::default()),
            InstrumentKind::Distribution => Self::Distribution(Distribution::new(buckets)),
        }
    }

    /// Returns the kind of this instrument.
    pub fn kind(&self) -> InstrumentKind {
        match self {
            Self::Scalar(_) => InstrumentKind::Scalar,
            Self::Distribution(_) => InstrumentKind::Distribution,
        }
    }

    /// Returns the scalar instrument, or `None` if this is a distribution.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(scalar) => Some(scalar),
            Self::Distribution(_) => None,
        }
    }

    /// Returns the distribution instrument, or `None` if this is a scalar.
    pub fn as_distribution(&self) -> Option<&Distribution> {
        match self {
            Self::Distribution(distribution) => Some(distribution),
            Self::Scalar(_) => None,
        }
    }

    pub(crate) fn register(
        &self,
        registry: &mut prometheus_client::registry::Registry,
        name: &str,
        help: String,
    ) {
        match self {
            Self::Scalar(scalar) => registry.register(name, help, scalar.0.clone()),
            Self::Distribution(distribution) => {
                registry.register(name, help, distribution.0.clone());
            }
        }
    }
}
