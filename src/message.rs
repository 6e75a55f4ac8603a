//! Wire-adjacent message types sent over the event channel. The real
//! wire/protobuf schema is an out-of-scope collaborator; these plain,
//! `serde`-derivable structs stage values before a real codec, until a
//! concrete transport is wired in.

use crate::clock::WallTime;
use crate::field::Field;

/// Units a metric's values are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Units {
    None,
    Nanoseconds,
}

/// Which kind of metric a [`MetricMetadata`] entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum MetricKind {
    CounterU64,
    Distribution,
}

/// Immutable-after-registration schema for one metric.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricMetadata {
    pub name: String,
    pub description: String,
    pub kind: MetricKind,
    pub cumulative: bool,
    pub sync: bool,
    pub units: Units,
    pub fields: Vec<Field>,
    /// Present only for [`MetricKind::Distribution`], length `N + 1`.
    pub bucket_lower_bounds: Option<Vec<i64>>,
}

/// Emitted once by `Initialize`/`Disable`. `Disable` emits an
/// empty registration, signalling that no metrics will follow.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricRegistration {
    pub metrics: Vec<MetricMetadata>,
    pub stages: Vec<String>,
}

/// The payload half of a [`MetricValue`].
#[derive(Debug, Clone, serde::Serialize)]
pub enum MetricPayload {
    Uint64(u64),
    /// `new_samples`, length `N + 2` (underflow, finite buckets, overflow).
    Distribution(Box<[u64]>),
}

/// One changed value in a delta emission.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricValue {
    pub name: String,
    pub field_values: Vec<String>,
    pub payload: MetricPayload,
}

/// One finished stage reported in a [`MetricUpdate`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct StageTimingMsg {
    pub stage: String,
    pub started: WallTime,
    pub ended: WallTime,
}

/// Emitted by `EmitMetricUpdate` when there are deltas.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricUpdate {
    pub metrics: Vec<MetricValue>,
    pub stage_timing: Vec<StageTimingMsg>,
}
