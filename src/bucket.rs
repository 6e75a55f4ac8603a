use std::time::Duration;

use crate::error::MetricError;

/// Deterministic sample -> bucket-index function with precomputed lower
/// bounds. `numFiniteBuckets in [1, 100]`; out-of-range
/// parameters panic, since they are a static wiring bug, not a runtime
/// outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBucketer {
    /// `lower[0] == 0`, length `numFiniteBuckets + 1`.
    lower: Box<[i64]>,
    max_sample: i64,
}

impl ExponentialBucketer {
    pub fn new(num_finite_buckets: usize, width: u64, scale: f64, growth: f64) -> Self {
        assert!(
            (1..=100).contains(&num_finite_buckets),
            "numFiniteBuckets must be in [1, 100], got {num_finite_buckets}"
        );
        let mut lower = vec![0i64; num_finite_buckets + 1];
        for (i, slot) in lower.iter_mut().enumerate().skip(1) {
            let value = (width as f64) * (i as f64) + scale * growth.powi(i as i32 - 1);
            *slot = value.floor() as i64;
        }
        let max_sample = lower[num_finite_buckets] - 1;
        Self {
            lower: lower.into_boxed_slice(),
            max_sample,
        }
    }

    pub fn num_finite_buckets(&self) -> usize {
        self.lower.len() - 1
    }

    pub fn max_sample(&self) -> i64 {
        self.max_sample
    }

    pub fn lower_bounds(&self) -> &[i64] {
        &self.lower
    }

    /// `-1` for underflow, `N` for overflow, otherwise the `i` such that
    /// `lower[i] <= sample < lower[i+1]`. Iterative binary search, no
    /// allocation, no recursion.
    pub fn bucket_index(&self, sample: i64) -> i64 {
        if sample < 0 {
            return -1;
        }
        if sample == 0 {
            return 0;
        }
        if sample > self.max_sample {
            return self.num_finite_buckets() as i64;
        }
        let idx = self.lower.partition_point(|&lower| lower <= sample) - 1;
        idx as i64
    }
}

/// Construction helper: solves for an exponent so that `numFiniteBuckets`
/// finite buckets span roughly `[min_duration, max_duration]` nanoseconds,
/// then delegates to [`ExponentialBucketer`].
pub fn duration_bucketer(
    num_finite_buckets: usize,
    min_duration: Duration,
    max_duration: Duration,
) -> ExponentialBucketer {
    assert!(
        num_finite_buckets > 3,
        "DurationBucketer requires more than 3 finite buckets, got {num_finite_buckets}"
    );
    let min_ns = min_duration.as_nanos() as f64;
    let max_ns = max_duration.as_nanos() as f64;
    assert!(min_ns > 0.0, "min_duration must be positive");
    let n = num_finite_buckets as f64;
    let coverage = (max_ns - (n - 3.0) * min_ns) / min_ns;
    let growth = coverage.ln() / (n - 3.0).ln();
    let width = min_ns / growth;
    let scale = min_ns / growth;
    ExponentialBucketer::new(num_finite_buckets, width.round() as u64, scale, growth)
}

/// Tagged variant over bucketer kinds, so [`crate::distribution::Distribution::add_sample`]
/// stays dispatch-free on the hot path: the variant is
/// matched directly rather than called through a `dyn` trait object. New
/// bucketer kinds are added by extending this enum and its match arms —
/// the engine ships exactly one, the exponential bucketer.
#[derive(Debug, Clone)]
pub enum Bucketer {
    Exponential(ExponentialBucketer),
}

impl Bucketer {
    pub fn bucket_index(&self, sample: i64) -> i64 {
        match self {
            Bucketer::Exponential(b) => b.bucket_index(sample),
        }
    }

    pub fn num_finite_buckets(&self) -> usize {
        match self {
            Bucketer::Exponential(b) => b.num_finite_buckets(),
        }
    }

    pub fn lower_bounds(&self) -> &[i64] {
        match self {
            Bucketer::Exponential(b) => b.lower_bounds(),
        }
    }

    /// Resolves a bucketer from a wire-level kind tag, the form a
    /// declarative metrics manifest names a bucketer by rather than
    /// constructing one directly in Rust. `"exponential"` is the only kind
    /// this engine ships; any other tag is a recoverable registration-time
    /// error, not a panic, since it can originate from external
    /// configuration rather than a call site under the registering
    /// process's control.
    pub fn from_kind(kind: &str, exponential: ExponentialBucketer) -> Result<Self, MetricError> {
        match kind {
            "exponential" => Ok(Bucketer::Exponential(exponential)),
            other => Err(MetricError::UnsupportedBucketer(other.to_string())),
        }
    }
}

impl From<ExponentialBucketer> for Bucketer {
    fn from(b: ExponentialBucketer) -> Self {
        Bucketer::Exponential(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_3_bucket_boundaries() {
        let b = ExponentialBucketer::new(3, 10, 0.0, 2.0);
        assert_eq!(b.lower_bounds(), &[0, 10, 20, 30]);
        assert_eq!(b.max_sample(), 29);
        assert_eq!(b.bucket_index(-1), -1);
        assert_eq!(b.bucket_index(0), 0);
        assert_eq!(b.bucket_index(9), 0);
        assert_eq!(b.bucket_index(10), 1);
        assert_eq!(b.bucket_index(19), 1);
        assert_eq!(b.bucket_index(20), 2);
        assert_eq!(b.bucket_index(29), 2);
        assert_eq!(b.bucket_index(30), 3);
        assert_eq!(b.bucket_index(1_000_000), 3);
    }

    #[test]
    fn lower_bounds_are_non_decreasing() {
        let b = ExponentialBucketer::new(20, 5, 1.0, 1.3);
        assert!(b.lower_bounds().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    #[should_panic]
    fn rejects_zero_buckets() {
        ExponentialBucketer::new(0, 1, 0.0, 2.0);
    }

    #[test]
    #[should_panic]
    fn rejects_too_many_buckets() {
        ExponentialBucketer::new(101, 1, 0.0, 2.0);
    }

    #[test]
    fn duration_bucketer_covers_requested_range() {
        let b = duration_bucketer(10, Duration::from_micros(1), Duration::from_secs(1));
        assert_eq!(b.num_finite_buckets(), 10);
        assert!(b.lower_bounds().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    #[should_panic]
    fn duration_bucketer_rejects_three_buckets() {
        duration_bucketer(3, Duration::from_nanos(1), Duration::from_nanos(100));
    }

    #[test]
    fn from_kind_accepts_exponential() {
        let b = Bucketer::from_kind("exponential", ExponentialBucketer::new(3, 10, 0.0, 2.0)).unwrap();
        assert_eq!(b.num_finite_buckets(), 3);
    }

    #[test]
    fn from_kind_rejects_unknown_tag() {
        let err = Bucketer::from_kind("log_linear", ExponentialBucketer::new(3, 10, 0.0, 2.0))
            .unwrap_err();
        assert!(matches!(err, crate::error::MetricError::UnsupportedBucketer(ref tag) if tag == "log_linear"));
    }

    #[test]
    fn duration_bucketer_at_minimum_bucket_count_is_non_decreasing() {
        let b = duration_bucketer(4, Duration::from_nanos(1), Duration::from_nanos(100));
        assert_eq!(b.num_finite_buckets(), 4);
        assert!(b.lower_bounds().windows(2).all(|w| w[0] <= w[1]));
    }

    proptest::proptest! {
        #[test]
        fn bucket_index_is_monotonic(
            n in 1usize..50,
            width in 1u64..1000,
            scale in 0.0f64..1000.0,
            growth in 1.01f64..5.0,
            s1 in -1000i64..1_000_000,
            s2 in -1000i64..1_000_000,
        ) {
            let b = ExponentialBucketer::new(n, width, scale, growth);
            if s1 <= s2 {
                assert!(b.bucket_index(s1) <= b.bucket_index(s2));
            }
        }

        #[test]
        fn bucket_index_matches_lower_bound_definition(
            n in 1usize..30,
            width in 1u64..200,
            scale in 0.0f64..200.0,
            growth in 1.01f64..4.0,
            sample in 0i64..200_000,
        ) {
            let b = ExponentialBucketer::new(n, width, scale, growth);
            let idx = b.bucket_index(sample);
            if idx >= 0 && (idx as usize) < b.num_finite_buckets() {
                let lower = b.lower_bounds();
                let i = idx as usize;
                assert!(lower[i] <= sample);
                assert!(sample < lower[i + 1]);
            }
        }
    }
}
