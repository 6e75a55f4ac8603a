//! In-process metrics for a sandboxed kernel-style runtime: counters,
//! distributions (histograms), and initialization-stage timings, emitted as
//! delta updates to an external consumer over an event channel.
//!
//! Four subsystems, leaves first: [`field::FieldMapper`] maps label tuples
//! to allocation-free keys; [`bucket`] provides the exponential bucketing
//! scheme; [`counter::CounterU64`] and [`distribution::Distribution`] are
//! the two metric kinds; [`registry::Registry`] is the two-phase
//! registration/freeze authority; [`emitter::Emitter`] diffs snapshots into
//! the minimal update stream the event channel actually sees.
//!
//! Metrics are process-lifetime: there is no unregistration and no
//! persistence across restart. See each module for the invariants that
//! back that guarantee.

pub mod bucket;
pub mod clock;
pub mod counter;
pub mod distribution;
pub mod emitter;
pub mod error;
pub mod field;
pub mod message;
pub mod registry;
pub mod sink;
pub mod stage;
pub mod timer;

pub use bucket::{duration_bucketer, Bucketer, ExponentialBucketer};
pub use clock::{Clock, SystemClock, WallTime};
pub use emitter::Emitter;
pub use error::MetricError;
pub use field::Field;
pub use message::{
    MetricKind, MetricMetadata, MetricPayload, MetricRegistration, MetricUpdate, MetricValue,
    StageTimingMsg, Units,
};
pub use registry::{CounterHandle, DistributionHandle, Registry};
pub use sink::{ChannelSink, EventSink, NullSink, SinkEvent};
pub use stage::{StageTimer, StageTiming};
pub use timer::{TimedOperation, Timer};
