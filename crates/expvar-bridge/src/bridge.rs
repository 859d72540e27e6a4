//! Conversion of snapshots into metric updates.

use serde_json::{Map, Value};

use std::sync::Arc;

use crate::{
    classify::{classify, ValueShape},
    instruments::Instrument,
    names::sanitize,
    registry::{MetricRegistry, RegistryError},
};

/// Snapshot of the JSON debug endpoint: a mapping from keys to arbitrary JSON values.
pub type Snapshot = Map<String, Value>;

/// Statistics about a single [`Bridge::update()`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Number of scalar instruments set.
    pub scalars_set: usize,
    /// Number of observations made on distribution instruments.
    pub observations: usize,
    /// Number of snapshot entries that do not map to a metric.
    pub ignored: usize,
    /// Number of instruments created during the update.
    pub created: usize,
}

/// Applies snapshots to a [`MetricRegistry`].
///
/// The registry is shared; it persists across updates, so metrics accumulate rather than reset.
#[derive(Debug, Clone, Default)]
pub struct Bridge {
    registry: Arc<MetricRegistry>,
}

impl Bridge {
    /// Creates a bridge writing to the specified registry.
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }

    /// Returns a reference to the underlying registry.
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Classifies each entry of the `snapshot`, resolves the corresponding instruments and applies
    /// observed values to them.
    ///
    /// # Errors
    ///
    /// Returns an error if instruments cannot be resolved (e.g., because of a kind mismatch
    /// between keys sanitized to the same name). In this case, the registry is not modified.
    pub fn update(&self, snapshot: &Snapshot) -> Result<UpdateSummary, RegistryError> {
        let mut summary = UpdateSummary::default();
        let mut names = Vec::with_capacity(snapshot.len());
        let mut shapes = Vec::with_capacity(snapshot.len());
        for (key, value) in snapshot {
            let shape = classify(key, value);
            if let Some(kind) = shape.instrument_kind() {
                names.push((sanitize(key), kind));
                shapes.push(shape);
            } else {
                summary.ignored += 1;
            }
        }

        let requests: Vec<_> = names
            .iter()
            .map(|(name, kind)| (name.as_str(), *kind))
            .collect();
        let (instruments, created) = self.registry.resolve(&requests)?;
        summary.created = created;

        for (instrument, shape) in instruments.iter().zip(&shapes) {
            match (instrument, shape) {
                (Instrument::Scalar(scalar), ValueShape::Scalar(value)) => {
                    scalar.set(*value);
                    summary.scalars_set += 1;
                }
                (Instrument::Distribution(distribution), ValueShape::Distribution(values)) => {
                    for &value in values {
                        distribution.observe(value);
                    }
                    summary.observations += values.len();
                }
                _ => unreachable!("instrument kinds are checked by the registry"),
            }
        }
        Ok(summary)
    }
}
