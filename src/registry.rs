use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::bucket::{Bucketer, ExponentialBucketer};
use crate::clock::Clock;
use crate::counter::{CounterSnapshot, CounterU64};
use crate::distribution::Distribution;
use crate::error::MetricError;
use crate::field::Field;
use crate::message::{MetricKind, MetricMetadata, MetricRegistration, Units};
use crate::sink::EventSink;
use crate::stage::StageTimer;
use crate::timer::Timer;

enum CounterBacking {
    Owned(CounterU64),
    /// `register_custom`: the value is supplied by a caller-provided read
    /// function rather than incremented through this API.
    Custom(Box<dyn Fn() -> u64 + Send + Sync>),
}

pub(crate) struct CounterEntry {
    pub(crate) metadata: MetricMetadata,
    backing: CounterBacking,
}

impl CounterEntry {
    pub(crate) fn snapshot(&self) -> CounterSnapshot {
        match &self.backing {
            CounterBacking::Owned(counter) => counter.snapshot(),
            CounterBacking::Custom(read) => CounterSnapshot::Scalar(read()),
        }
    }
}

pub(crate) struct DistributionEntry {
    pub(crate) metadata: MetricMetadata,
    pub(crate) distribution: Arc<Distribution>,
}

/// A handle to a registered, zero- or one-field counter.
#[derive(Clone)]
pub struct CounterHandle(Arc<CounterEntry>);

impl CounterHandle {
    pub fn increment_by(&self, delta: u64, values: &[&str]) {
        match &self.0.backing {
            CounterBacking::Owned(counter) => counter.increment_by(delta, values),
            CounterBacking::Custom(_) => {
                panic!("custom counters are read-only; their value comes from the registered read function")
            }
        }
    }

    pub fn increment(&self, values: &[&str]) {
        self.increment_by(1, values);
    }

    pub fn value(&self, values: &[&str]) -> u64 {
        match &self.0.backing {
            CounterBacking::Owned(counter) => counter.value(values),
            CounterBacking::Custom(read) => {
                assert!(values.is_empty(), "custom counters take no field values");
                read()
            }
        }
    }
}

/// A handle to a registered distribution.
#[derive(Clone)]
pub struct DistributionHandle(Arc<DistributionEntry>);

impl DistributionHandle {
    pub fn add_sample(&self, sample: i64, values: &[&str]) {
        self.0.distribution.add_sample(sample, values);
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum RegisteredKind {
    Counter,
    Distribution,
}

/// Global two-phase registry: registration is a critical section (startup),
/// then `Initialize`/`Disable` freezes the metric maps.
pub struct Registry {
    clock: Arc<dyn Clock>,
    counters: RwLock<HashMap<String, Arc<CounterEntry>>>,
    distributions: RwLock<HashMap<String, Arc<DistributionEntry>>>,
    registration_order: Mutex<Vec<(RegisteredKind, String)>>,
    stage_timer: Arc<StageTimer>,
    initialized: AtomicBool,
}

impl Registry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let stage_timer = StageTimer::new(clock.clone());
        Self {
            clock,
            counters: RwLock::new(HashMap::new()),
            distributions: RwLock::new(HashMap::new()),
            registration_order: Mutex::new(Vec::new()),
            stage_timer,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn stage_timer(&self) -> &Arc<StageTimer> {
        &self.stage_timer
    }

    fn check_name_available(&self, name: &str) -> Result<(), MetricError> {
        if self.initialized.load(Ordering::SeqCst) {
            return Err(MetricError::InitializationDone);
        }
        let counters = self.counters.read().unwrap();
        let distributions = self.distributions.read().unwrap();
        if counters.contains_key(name) || distributions.contains_key(name) {
            return Err(MetricError::NameInUse(name.to_string()));
        }
        Ok(())
    }

    /// Registers a counter with zero or one field. More than one field is a
    /// static wiring bug, not a runtime-recoverable error.
    pub fn register_counter(
        &self,
        name: &str,
        description: &str,
        cumulative: bool,
        sync: bool,
        fields: Vec<Field>,
    ) -> Result<CounterHandle, MetricError> {
        assert!(
            fields.len() <= 1,
            "counters support at most one field, got {}",
            fields.len()
        );
        self.check_name_available(name)?;
        let backing = match fields.first() {
            Some(field) => CounterBacking::Owned(CounterU64::new_sharded(field)),
            None => CounterBacking::Owned(CounterU64::new_scalar()),
        };
        let metadata = MetricMetadata {
            name: name.to_string(),
            description: description.to_string(),
            kind: MetricKind::CounterU64,
            cumulative,
            sync,
            units: Units::None,
            fields,
            bucket_lower_bounds: None,
        };
        let entry = Arc::new(CounterEntry { metadata, backing });
        self.counters
            .write()
            .unwrap()
            .insert(name.to_string(), entry.clone());
        self.registration_order
            .lock()
            .unwrap()
            .push((RegisteredKind::Counter, name.to_string()));
        Ok(CounterHandle(entry))
    }

    /// Registers a counter whose value is supplied by `read`, called on
    /// every snapshot.
    pub fn register_custom_counter(
        &self,
        name: &str,
        description: &str,
        units: Units,
        read: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Result<(), MetricError> {
        self.check_name_available(name)?;
        let metadata = MetricMetadata {
            name: name.to_string(),
            description: description.to_string(),
            kind: MetricKind::CounterU64,
            cumulative: false,
            sync: false,
            units,
            fields: Vec::new(),
            bucket_lower_bounds: None,
        };
        let entry = Arc::new(CounterEntry {
            metadata,
            backing: CounterBacking::Custom(Box::new(read)),
        });
        self.counters.write().unwrap().insert(name.to_string(), entry);
        self.registration_order
            .lock()
            .unwrap()
            .push((RegisteredKind::Counter, name.to_string()));
        Ok(())
    }

    pub fn register_distribution(
        &self,
        name: &str,
        description: &str,
        cumulative: bool,
        sync: bool,
        fields: Vec<Field>,
        bucketer: impl Into<Bucketer>,
    ) -> Result<DistributionHandle, MetricError> {
        self.check_name_available(name)?;
        let bucketer = bucketer.into();
        let metadata = MetricMetadata {
            name: name.to_string(),
            description: description.to_string(),
            kind: MetricKind::Distribution,
            cumulative,
            sync,
            units: Units::None,
            fields: fields.clone(),
            bucket_lower_bounds: Some(bucketer.lower_bounds().to_vec()),
        };
        let distribution = Arc::new(Distribution::new(&fields, bucketer));
        let entry = Arc::new(DistributionEntry {
            metadata,
            distribution,
        });
        self.distributions
            .write()
            .unwrap()
            .insert(name.to_string(), entry.clone());
        self.registration_order
            .lock()
            .unwrap()
            .push((RegisteredKind::Distribution, name.to_string()));
        Ok(DistributionHandle(entry))
    }

    /// Registers a distribution whose bucketer is selected by a wire-level
    /// kind tag rather than constructed directly, e.g. when registration is
    /// driven by a declarative metrics manifest loaded from configuration.
    /// Returns `UnsupportedBucketer` for any kind this engine doesn't ship.
    pub fn register_distribution_from_kind(
        &self,
        name: &str,
        description: &str,
        cumulative: bool,
        sync: bool,
        fields: Vec<Field>,
        bucketer_kind: &str,
        exponential: ExponentialBucketer,
    ) -> Result<DistributionHandle, MetricError> {
        let bucketer = Bucketer::from_kind(bucketer_kind, exponential)?;
        self.register_distribution(name, description, cumulative, sync, fields, bucketer)
    }

    /// Registers a distribution with nanosecond units and wraps it as a
    /// [`Timer`].
    pub fn register_timer(
        &self,
        name: &str,
        description: &str,
        sync: bool,
        fields: Vec<Field>,
        bucketer: impl Into<Bucketer>,
    ) -> Result<Timer, MetricError> {
        self.check_name_available(name)?;
        let bucketer = bucketer.into();
        let metadata = MetricMetadata {
            name: name.to_string(),
            description: description.to_string(),
            kind: MetricKind::Distribution,
            cumulative: true,
            sync,
            units: Units::Nanoseconds,
            fields: fields.clone(),
            bucket_lower_bounds: Some(bucketer.lower_bounds().to_vec()),
        };
        let distribution = Arc::new(Distribution::new(&fields, bucketer));
        let entry = Arc::new(DistributionEntry {
            metadata,
            distribution: distribution.clone(),
        });
        self.distributions
            .write()
            .unwrap()
            .insert(name.to_string(), entry);
        self.registration_order
            .lock()
            .unwrap()
            .push((RegisteredKind::Distribution, name.to_string()));
        Ok(Timer {
            distribution,
            clock: self.clock.clone(),
        })
    }

    fn registered_metadata(&self) -> Vec<MetricMetadata> {
        let order = self.registration_order.lock().unwrap();
        let counters = self.counters.read().unwrap();
        let distributions = self.distributions.read().unwrap();
        order
            .iter()
            .map(|(kind, name)| match kind {
                RegisteredKind::Counter => counters[name].metadata.clone(),
                RegisteredKind::Distribution => distributions[name].metadata.clone(),
            })
            .collect()
    }

    /// Transitions `initialized` from false to true exactly once, emitting
    /// a `MetricRegistration` describing every registered metric plus the
    /// known init stages.
    pub fn initialize(&self, sink: &dyn EventSink) -> Result<(), MetricError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(MetricError::DoubleInitialize);
        }
        sink.send_registration(MetricRegistration {
            metrics: self.registered_metadata(),
            stages: self.stage_timer.known_stage_names(),
        })
    }

    /// Transitions `initialized` from false to true exactly once, emitting
    /// an empty `MetricRegistration` signalling that no metrics will follow
    ///.
    pub fn disable(&self, sink: &dyn EventSink) -> Result<(), MetricError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(MetricError::DoubleInitialize);
        }
        sink.send_registration(MetricRegistration {
            metrics: Vec::new(),
            stages: Vec::new(),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub(crate) fn counters_snapshot(&self) -> HashMap<String, CounterSnapshot> {
        self.counters
            .read()
            .unwrap()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.snapshot()))
            .collect()
    }

    pub(crate) fn distributions_snapshot(
        &self,
    ) -> HashMap<String, HashMap<String, (Box<[u64]>, u64)>> {
        self.distributions
            .read()
            .unwrap()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.distribution.snapshot()))
            .collect()
    }
}
