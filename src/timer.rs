use std::sync::Arc;

use crate::clock::Clock;
use crate::distribution::Distribution;

/// A [`Distribution`] whose samples are measured durations in nanoseconds
///.
pub struct Timer {
    pub(crate) distribution: Arc<Distribution>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Timer {
    /// Read the clock and stash the partial field prefix by reference — no
    /// allocation. Callers that don't yet know every label value (e.g. the
    /// branch an operation takes) pass only the values they already know;
    /// the rest are supplied to [`TimedOperation::finish`].
    pub fn start<'a>(&'a self, partial_values: &'a [&'a str]) -> TimedOperation<'a> {
        TimedOperation {
            start_nanos: self.clock.now_nanos(),
            partial_values,
            timer: self,
        }
    }
}

/// An in-flight timed operation returned by [`Timer::start`]. Consuming it
/// via [`finish`](Self::finish) reads the clock again, resolves the full
/// field key via `lookup_concat(partial, extra)`, and records the elapsed
/// nanoseconds as a sample. If the partial and extra field
/// counts don't sum to the distribution's field count, resolution panics —
/// a programmer-contract violation.
pub struct TimedOperation<'a> {
    start_nanos: i64,
    partial_values: &'a [&'a str],
    timer: &'a Timer,
}

impl<'a> TimedOperation<'a> {
    pub fn finish(self, extra_values: &[&str]) {
        let end_nanos = self.timer.clock.now_nanos();
        let elapsed = end_nanos - self.start_nanos;
        let key = self
            .timer
            .distribution
            .mapper()
            .lookup_concat(self.partial_values, extra_values);
        self.timer.distribution.record(elapsed, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::ExponentialBucketer;
    use crate::clock::WallTime;
    use crate::field::Field;

    struct FixedClock {
        nanos: std::sync::atomic::AtomicI64,
    }
    impl Clock for FixedClock {
        fn now_nanos(&self) -> i64 {
            self.nanos.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
        }
        fn wall_now(&self) -> WallTime {
            WallTime { secs: 0, nanos: 0 }
        }
    }

    #[test]
    fn scenario_5_timer_partial_fields() {
        let field = Field::new("path", ["fast", "slow"]).unwrap();
        let distribution = Arc::new(Distribution::new(
            &[field],
            ExponentialBucketer::new(3, 10, 0.0, 2.0).into(),
        ));
        let clock: Arc<dyn Clock> = Arc::new(FixedClock {
            nanos: std::sync::atomic::AtomicI64::new(0),
        });
        let timer = Timer {
            distribution: distribution.clone(),
            clock,
        };
        let op = timer.start(&[]);
        op.finish(&["fast"]);
        let snap = distribution.snapshot();
        let (_, total) = &snap["fast"];
        assert_eq!(*total, 1);
        let (_, total_slow) = &snap["slow"];
        assert_eq!(*total_slow, 0);
    }
}
