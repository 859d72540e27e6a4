#[derive(Debug, Clone, Copy)]
enum BucketsInner {
    Slice(&'static [f64]),
    Linear { start: f64, width: f64, count: usize },
}

impl BucketsInner {
    #[allow(clippy::cast_precision_loss)] // bucket counts are tiny
    fn iter(self) -> Box<dyn Iterator<Item = f64>> {
        match self {
            Self::Slice(slice) => Box::new(slice.iter().copied()),
            Self::Linear {
                start,
                width,
                count,
            } => {
                let it = (0..count).map(move |idx| start + width * idx as f64);
                Box::new(it)
            }
        }
    }
}

/// Buckets configuration for [distribution instruments](crate::Instrument::Distribution).
///
/// Bucket bounds are upper inclusive bounds; an overflow bucket (`+Inf`) is always added
/// by the encoder and should not be specified.
#[derive(Debug, Clone, Copy)]
pub struct Buckets(BucketsInner);

impl Buckets {
    /// Default layout for distributions: 3 linear buckets starting at 0.001 with 0.001 width,
    /// i.e. `0.001, 0.002, 0.003`.
    pub const DISTRIBUTION: Self = Self::linear(0.001, 0.001, 3);

    /// Creates buckets based on the provided `values`.
    ///
    /// # Panics
    ///
    /// Panics if `values` are empty or are not monotonically increasing.
    pub const fn values(values: &'static [f64]) -> Self {
        assert!(!values.is_empty(), "Values cannot be empty");

        let mut i = 1;
        while i < values.len() {
            assert!(
                values[i] > values[i - 1],
                "Values must be monotonically increasing"
            );
            i += 1;
        }
        Self(BucketsInner::Slice(values))
    }

    /// Creates `count` linear buckets: `start`, `start + width`, ..., `start + (count - 1) * width`.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero, or if `width` is not positive.
    pub const fn linear(start: f64, width: f64, count: usize) -> Self {
        assert!(count > 0, "Bucket count must be positive");
        assert!(width > 0.0, "Width must be positive");
        Self(BucketsInner::Linear {
            start,
            width,
            count,
        })
    }

    /// Iterates over upper bucket bounds (excluding `+Inf`).
    pub fn iter(self) -> impl Iterator<Item = f64> {
        self.0.iter()
    }
}

impl Default for Buckets {
    fn default() -> Self {
        Self::DISTRIBUTION
    }
}

impl<const N: usize> From<&'static [f64; N]> for Buckets {
    fn from(values: &'static [f64; N]) -> Self {
        Self::values(values)
    }
}
