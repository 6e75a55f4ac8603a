use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::field::Field;

/// Snapshot of a counter's current value(s), taken without holding the
/// counter's own lock for longer than a single read.
#[derive(Debug, Clone, PartialEq)]
pub enum CounterSnapshot {
    Scalar(u64),
    PerField(HashMap<String, u64>),
}

/// Atomic cumulative counter, optionally sharded by one label.
/// The zero-field case never locks; the one-field case is guarded by a
/// reader/writer lock local to the counter. The shard map's key set is
/// fixed at construction, so increments only ever mutate an existing
/// entry's atomic through a shared reference — both `increment_by` and
/// `value` only need the read lock.
#[derive(Debug)]
pub(crate) enum CounterU64 {
    Scalar(AtomicU64),
    Sharded(RwLock<HashMap<String, AtomicU64>>),
}

impl CounterU64 {
    pub(crate) fn new_scalar() -> Self {
        CounterU64::Scalar(AtomicU64::new(0))
    }

    pub(crate) fn new_sharded(field: &Field) -> Self {
        let values = field
            .allowed_values
            .iter()
            .map(|value| (value.clone(), AtomicU64::new(0)))
            .collect();
        CounterU64::Sharded(RwLock::new(values))
    }

    pub fn increment_by(&self, delta: u64, values: &[&str]) {
        match self {
            CounterU64::Scalar(counter) => {
                assert!(values.is_empty(), "this counter takes no field values");
                counter.fetch_add(delta, Ordering::Relaxed);
            }
            CounterU64::Sharded(shards) => {
                assert_eq!(values.len(), 1, "this counter takes exactly one field value");
                let guard = shards.read().unwrap();
                let counter = guard
                    .get(values[0])
                    .unwrap_or_else(|| panic!("unknown field value {:?}", values[0]));
                counter.fetch_add(delta, Ordering::Relaxed);
            }
        }
    }

    pub fn increment(&self, values: &[&str]) {
        self.increment_by(1, values);
    }

    pub fn value(&self, values: &[&str]) -> u64 {
        match self {
            CounterU64::Scalar(counter) => {
                assert!(values.is_empty(), "this counter takes no field values");
                counter.load(Ordering::Relaxed)
            }
            CounterU64::Sharded(shards) => {
                assert_eq!(values.len(), 1, "this counter takes exactly one field value");
                let guard = shards.read().unwrap();
                guard
                    .get(values[0])
                    .unwrap_or_else(|| panic!("unknown field value {:?}", values[0]))
                    .load(Ordering::Relaxed)
            }
        }
    }

    pub(crate) fn snapshot(&self) -> CounterSnapshot {
        match self {
            CounterU64::Scalar(counter) => CounterSnapshot::Scalar(counter.load(Ordering::Relaxed)),
            CounterU64::Sharded(shards) => {
                let guard = shards.read().unwrap();
                CounterSnapshot::PerField(
                    guard
                        .iter()
                        .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
                        .collect(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn scalar_counter_sums_increments_regardless_of_interleaving() {
        let counter = Arc::new(CounterU64::new_scalar());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.increment(&[]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.value(&[]), 8000);
    }

    #[test]
    fn sharded_counter_tracks_each_field_value_independently() {
        let field = Field::new("color", ["red", "blue"]).unwrap();
        let counter = CounterU64::new_sharded(&field);
        counter.increment_by(1, &["red"]);
        assert_eq!(counter.value(&["red"]), 1);
        assert_eq!(counter.value(&["blue"]), 0);
    }

    #[test]
    #[should_panic]
    fn sharded_counter_rejects_unknown_value() {
        let field = Field::new("color", ["red", "blue"]).unwrap();
        let counter = CounterU64::new_sharded(&field);
        counter.increment(&["green"]);
    }

    #[test]
    #[should_panic]
    fn scalar_counter_rejects_field_values() {
        let counter = CounterU64::new_scalar();
        counter.increment(&["red"]);
    }
}
