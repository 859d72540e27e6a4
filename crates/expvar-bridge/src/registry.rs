//! Registry of converted metrics.

use prometheus_client::{encoding::text, registry::Registry as RegistryInner};

use std::{
    collections::HashMap,
    error, fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{
    buckets::Buckets,
    format::{Format, PrometheusWrapper},
    instruments::{Instrument, InstrumentKind},
    names::{validate_metric_name, InvalidName},
};

/// Error that can occur when resolving instruments in a [`MetricRegistry`].
#[derive(Debug)]
#[non_exhaustive]
pub enum RegistryError {
    /// Metric name is not a valid identifier in the exposition format.
    InvalidName {
        /// Offending name.
        name: String,
        /// Reason why the name is invalid.
        source: InvalidName,
    },
    /// Metric with the same name was registered with another instrument kind.
    KindMismatch {
        /// Metric name.
        name: String,
        /// Kind of the already registered instrument.
        registered: InstrumentKind,
        /// Requested instrument kind.
        requested: InstrumentKind,
    },
    /// Metric name clashes with a series derived from a distribution (e.g., `<name>_count`),
    /// so both metrics would emit samples with the same name.
    SeriesCollision {
        /// Metric name.
        name: String,
        /// Name of the distribution instrument whose series clash with the metric.
        distribution: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName { name, source } => {
                write!(formatter, "invalid metric name `{name}`: {source}")
            }
            Self::KindMismatch {
                name,
                registered,
                requested,
            } => write!(
                formatter,
                "metric `{name}` is already registered as a {registered} instrument; \
                 cannot use it as a {requested} instrument"
            ),
            Self::SeriesCollision { name, distribution } => write!(
                formatter,
                "metric `{name}` collides with series of the distribution instrument \
                 `{distribution}`"
            ),
        }
    }
}

impl error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidName { source, .. } => Some(source),
            Self::KindMismatch { .. } | Self::SeriesCollision { .. } => None,
        }
    }
}

/// Suffixes of series emitted for a distribution in addition to its own name.
const DISTRIBUTION_SERIES_SUFFIXES: [&str; 3] = ["_bucket", "_count", "_sum"];

#[derive(Debug, Default)]
struct RegistryState {
    inner: RegistryInner,
    instruments: HashMap<String, Instrument>,
}

impl RegistryState {
    /// Checks whether an instrument of the specified kind can be returned for `name`.
    /// `pending` contains names that are going to be created in the same batch.
    fn check(
        &self,
        name: &str,
        kind: InstrumentKind,
        pending: &HashMap<&str, InstrumentKind>,
    ) -> Result<(), RegistryError> {
        let kind_of = |name: &str| {
            self.instruments
                .get(name)
                .map(Instrument::kind)
                .or_else(|| pending.get(name).copied())
        };

        match kind_of(name) {
            Some(registered) if registered != kind => Err(RegistryError::KindMismatch {
                name: name.to_owned(),
                registered,
                requested: kind,
            }),
            Some(_) => Ok(()),
            None => {
                validate_metric_name(name).map_err(|source| RegistryError::InvalidName {
                    name: name.to_owned(),
                    source,
                })?;
                Self::check_series_collision(name, kind, kind_of)
            }
        }
    }

    /// Checks that a new metric doesn't emit the same sample names as an existing or pending one.
    fn check_series_collision(
        name: &str,
        kind: InstrumentKind,
        kind_of: impl Fn(&str) -> Option<InstrumentKind>,
    ) -> Result<(), RegistryError> {
        let distribution = DISTRIBUTION_SERIES_SUFFIXES.iter().find_map(|suffix| {
            let base = name.strip_suffix(suffix)?;
            (kind_of(base) == Some(InstrumentKind::Distribution)).then_some(base)
        });
        if let Some(distribution) = distribution {
            return Err(RegistryError::SeriesCollision {
                name: name.to_owned(),
                distribution: distribution.to_owned(),
            });
        }

        if kind == InstrumentKind::Distribution {
            let clashing_series = DISTRIBUTION_SERIES_SUFFIXES
                .iter()
                .map(|suffix| format!("{name}{suffix}"))
                .find(|series| kind_of(series.as_str()).is_some());
            if let Some(series) = clashing_series {
                return Err(RegistryError::SeriesCollision {
                    name: series,
                    distribution: name.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Must be called after a successful `check()`. The returned flag is set if the instrument
    /// was created by this call.
    fn get_or_create(
        &mut self,
        name: &str,
        kind: InstrumentKind,
        buckets: Buckets,
    ) -> (Instrument, bool) {
        if let Some(instrument) = self.instruments.get(name) {
            return (instrument.clone(), false);
        }

        let instrument = Instrument::new(kind, buckets);
        instrument.register(&mut self.inner, name, format!("Metric for {name}"));
        self.instruments.insert(name.to_owned(), instrument.clone());
        tracing::info!(name, %kind, "Created new {kind} metric `{name}`");
        (instrument, true)
    }
}

/// Registry of metrics converted from snapshots.
///
/// The registry maps metric names to [`Instrument`]s. Instruments are created lazily on first request
/// and are never removed; all instruments are encoded on each [`Self::encode()`] call.
/// The registry is thread-safe; it is usually shared via an `Arc`.
#[derive(Debug)]
pub struct MetricRegistry {
    state: Mutex<RegistryState>,
    distribution_buckets: Buckets,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    /// Creates an empty registry using [`Buckets::DISTRIBUTION`] for distribution instruments.
    pub fn new() -> Self {
        Self::with_distribution_buckets(Buckets::DISTRIBUTION)
    }

    /// Creates an empty registry with custom buckets for distribution instruments.
    pub fn with_distribution_buckets(buckets: Buckets) -> Self {
        Self {
            state: Mutex::default(),
            distribution_buckets: buckets,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // The state is never left half-updated on panic, so it's safe to recover from poisoning.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the instrument with the specified name, creating and registering it if necessary.
    ///
    /// # Errors
    ///
    /// - Returns an error if the instrument exists, but has another kind.
    /// - Returns an error if the instrument is missing and `name` is not a valid metric name.
    /// - Returns an error if the instrument is missing and its series would clash with series
    ///   of an existing distribution (e.g., a scalar named `<distribution>_count`), or vice versa.
    pub fn ensure(&self, name: &str, kind: InstrumentKind) -> Result<Instrument, RegistryError> {
        let mut state = self.lock();
        state.check(name, kind, &HashMap::new())?;
        Ok(state.get_or_create(name, kind, self.distribution_buckets).0)
    }

    /// Resolves multiple instruments atomically. Instruments are returned in the order of `requests`.
    /// If any request fails, no instruments are created.
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as [`Self::ensure()`], including the case when
    /// `requests` contain the same name with different kinds.
    pub fn ensure_all(
        &self,
        requests: &[(&str, InstrumentKind)],
    ) -> Result<Vec<Instrument>, RegistryError> {
        Ok(self.resolve(requests)?.0)
    }

    /// Same as [`Self::ensure_all()`], but also returns the number of created instruments.
    pub(crate) fn resolve(
        &self,
        requests: &[(&str, InstrumentKind)],
    ) -> Result<(Vec<Instrument>, usize), RegistryError> {
        let mut state = self.lock();
        let mut pending = HashMap::new();
        for &(name, kind) in requests {
            state.check(name, kind, &pending)?;
            if !state.instruments.contains_key(name) {
                pending.insert(name, kind);
            }
        }

        let mut created_count = 0;
        let instruments = requests
            .iter()
            .map(|&(name, kind)| {
                let (instrument, created) =
                    state.get_or_create(name, kind, self.distribution_buckets);
                created_count += usize::from(created);
                instrument
            })
            .collect();
        Ok((instruments, created_count))
    }

    /// Returns the instrument with the specified name, if it was created previously.
    pub fn get(&self, name: &str) -> Option<Instrument> {
        self.lock().instruments.get(name).cloned()
    }

    /// Returns sorted names of all instruments in this registry.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().instruments.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of instruments in this registry.
    pub fn len(&self) -> usize {
        self.lock().instruments.len()
    }

    /// Checks whether this registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes all metrics in this registry using the specified format.
    ///
    /// # Errors
    ///
    /// Proxies formatting errors of the provided `writer`.
    pub fn encode<W: fmt::Write>(&self, writer: &mut W, format: Format) -> fmt::Result {
        let state = self.lock();
        match format {
            Format::OpenMetrics => text::encode(writer, &state.inner),
            Format::Prometheus => {
                let mut wrapper = PrometheusWrapper::new(writer);
                text::encode(&mut wrapper, &state.inner)?;
                wrapper.flush()
            }
        }
    }
}
