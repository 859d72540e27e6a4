//! Inference of metric shapes from snapshot values.

use serde_json::Value;

use crate::instruments::InstrumentKind;

/// Prefix of snapshot keys whose object values are treated as latency distributions.
pub const DISTRIBUTION_KEY_PREFIX: &str = "t_succ";

/// Entries of a distribution object that are fed into the distribution, in observation order.
pub const QUANTILE_KEYS: [&str; 3] = ["p50", "p90", "p99"];

/// Metric shape inferred for a single snapshot entry by [`classify()`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValueShape {
    /// Numeric value driving a scalar (gauge) instrument.
    Scalar(f64),
    /// Object with pre-computed quantiles driving a distribution (histogram) instrument.
    ///
    /// Each quantile value is observed as an independent sample, so a single snapshot
    /// contributes up to 3 observations to the same histogram. This mixes up pre-computed
    /// percentiles with raw samples; it is retained for output compatibility with existing
    /// dashboards and should not be used as a model for new conversions.
    Distribution(Vec<f64>),
    /// Value that does not map to a metric.
    Ignored,
}

impl ValueShape {
    /// Returns the kind of instrument driven by this shape, or `None` for [`Self::Ignored`].
    pub fn instrument_kind(&self) -> Option<InstrumentKind> {
        match self {
            Self::Scalar(_) => Some(InstrumentKind::Scalar),
            Self::Distribution(_) => Some(InstrumentKind::Distribution),
            Self::Ignored => None,
        }
    }
}

/// Classifies a snapshot `value` stored under the (unsanitized) `key`.
///
/// - Numbers (both integer and floating-point) are [scalars](ValueShape::Scalar).
/// - Objects under keys starting with [`DISTRIBUTION_KEY_PREFIX`] are [distributions](ValueShape::Distribution);
///   only numeric entries named as in [`QUANTILE_KEYS`] are observed.
/// - Everything else is [ignored](ValueShape::Ignored).
pub fn classify(key: &str, value: &Value) -> ValueShape {
    match value {
        Value::Number(number) => number.as_f64().map_or(ValueShape::Ignored, ValueShape::Scalar),
        Value::Object(entries) if key.starts_with(DISTRIBUTION_KEY_PREFIX) => {
            let observations = QUANTILE_KEYS
                .iter()
                .filter_map(|&quantile| entries.get(quantile)?.as_f64())
                .collect();
            ValueShape::Distribution(observations)
        }
        _ => ValueShape::Ignored,
    }
}
