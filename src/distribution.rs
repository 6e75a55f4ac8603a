use std::array;
use std::collections::HashMap;

#[cfg(not(loom))]
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::bucket::Bucketer;
use crate::field::{Field, FieldMapper};

const COUNTERS_PER_CACHE_LINE: usize = align_of::<CachePadded<()>>() / align_of::<AtomicU64>();

/// Dense bucket-counter storage for one field key, packed into cache lines
/// to keep grouped atomic increments on the hot path from false-sharing
/// with neighboring buckets. Stores only per-bucket counts, no running sum.
#[derive(Debug)]
struct BucketStorage(Box<[CachePadded<[AtomicU64; COUNTERS_PER_CACHE_LINE]>]>);

impl BucketStorage {
    fn new(bucket_count: usize) -> Self {
        let cache_lines = bucket_count.div_ceil(COUNTERS_PER_CACHE_LINE);
        let lines = (0..cache_lines)
            .map(|_| CachePadded::new(array::from_fn(|_| AtomicU64::new(0))))
            .collect();
        Self(lines)
    }

    fn get(&self, index: usize) -> &AtomicU64 {
        &self.0[index / COUNTERS_PER_CACHE_LINE][index % COUNTERS_PER_CACHE_LINE]
    }

    fn iter(&self, bucket_count: usize) -> impl Iterator<Item = &AtomicU64> {
        self.0
            .iter()
            .flat_map(|line| line.iter())
            .take(bucket_count)
    }
}

/// Per-field-key array of bucket counters with lock-free sample insertion.
/// The sample array is pre-sized for every possible field key at
/// registration time via [`FieldMapper::enumerate`]; no lock is taken on
/// `add_sample`.
#[derive(Debug)]
pub struct Distribution {
    mapper: FieldMapper,
    bucketer: Bucketer,
    bucket_count: usize,
    samples: HashMap<String, BucketStorage>,
}

impl Distribution {
    pub(crate) fn new(fields: &[Field], bucketer: Bucketer) -> Self {
        let mapper = FieldMapper::new(fields);
        let bucket_count = bucketer.num_finite_buckets() + 2;
        let samples = mapper
            .enumerate()
            .into_iter()
            .map(|key| (key, BucketStorage::new(bucket_count)))
            .collect();
        Self {
            mapper,
            bucketer,
            bucket_count,
            samples
        }
    }

    pub fn bucketer(&self) -> &Bucketer {
        &self.bucketer
    }

    pub(crate) fn mapper(&self) -> &FieldMapper {
        &self.mapper
    }

    /// `key = mapper.lookup(values)`, `idx = bucketer.bucket_index(sample)`
    /// mapped from `-1..=N` to storage index `idx+1` in `[0, N+1]`, then an
    /// atomic increment — no lock taken.
    pub fn add_sample(&self, sample: i64, values: &[&str]) {
        let key = self.mapper.lookup(values);
        self.record(sample, key);
    }

    /// Record a sample against an already-resolved key, used by
    /// [`crate::timer::Timer`] after it resolves the field key via
    /// `lookup_concat`.
    pub(crate) fn record(&self, sample: i64, key: &str) {
        let idx = self.bucketer.bucket_index(sample);
        let storage_index = (idx + 1) as usize;
        let storage = self
            .samples
            .get(key)
            .unwrap_or_else(|| panic!("field key {key:?} was not pre-sized at registration"));
        storage.get(storage_index).fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot every field key's bucket array and total sample count via
    /// atomic loads only. Field keys with zero total samples are omitted by
    /// the caller, not here — callers diffing against a previous snapshot
    /// still need to see a present-but-zero entry.
    pub(crate) fn snapshot(&self) -> HashMap<String, (Box<[u64]>, u64)> {
        self.samples
            .iter()
            .map(|(key, storage)| {
                let mut total = 0u64;
                let buckets: Box<[u64]> = storage
                    .iter(self.bucket_count)
                    .map(|counter| {
                        let value = counter.load(Ordering::Relaxed);
                        total += value;
                        value
                    })
                    .collect();
                (key.clone(), (buckets, total))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::ExponentialBucketer;
    use std::sync::Arc;
    use std::thread;

    fn scenario_4_distribution() -> Distribution {
        Distribution::new(&[], ExponentialBucketer::new(3, 10, 0.0, 2.0).into())
    }

    #[test]
    fn scenario_4_distribution_delta() {
        let dist = scenario_4_distribution();
        dist.add_sample(5, &[]);
        dist.add_sample(15, &[]);
        dist.add_sample(100, &[]);
        let snap = dist.snapshot();
        let (buckets, total) = &snap[""];
        assert_eq!(total, &3);
        assert_eq!(&**buckets, &[0, 1, 1, 0, 1][..]);
    }

    #[test]
    fn sum_of_bucket_counts_equals_add_sample_calls() {
        let dist = Distribution::new(&[], ExponentialBucketer::new(3, 10, 0.0, 2.0).into());
        for sample in [-5, 0, 3, 10, 25, 1_000_000] {
            dist.add_sample(sample, &[]);
        }
        let (_, total) = &dist.snapshot()[""];
        assert_eq!(*total, 6);
    }

    #[test]
    fn concurrent_add_sample_commute() {
        let dist = Arc::new(Distribution::new(&[], ExponentialBucketer::new(3, 10, 0.0, 2.0).into()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dist = dist.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        dist.add_sample(5, &[]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let (_, total) = &dist.snapshot()[""];
        assert_eq!(*total, 4000);
    }

    #[test]
    #[should_panic]
    fn add_sample_rejects_unknown_field_value() {
        let field = crate::field::Field::new("color", ["red"]).unwrap();
        let dist = Distribution::new(&[field], ExponentialBucketer::new(3, 10, 0.0, 2.0).into());
        dist.add_sample(1, &["blue"]);
    }
}

#[cfg(loom)]
mod loom_tests {
    use super::*;
    use crate::bucket::ExponentialBucketer;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn concurrent_add_sample_commutes() {
        loom::model(|| {
            let dist = Arc::new(Distribution::new(&[], ExponentialBucketer::new(3, 10, 0.0, 2.0).into()));
            let d1 = dist.clone();
            let d2 = dist.clone();
            let t1 = thread::spawn(move || d1.add_sample(5, &[]));
            let t2 = thread::spawn(move || d2.add_sample(5, &[]));
            t1.join().unwrap();
            t2.join().unwrap();
            let (_, total) = &dist.snapshot()[""];
            assert_eq!(*total, 2);
        });
    }
}
