use thiserror::Error;

/// Errors surfaced to callers of the registration and emission APIs.
///
/// Programmer-contract violations (wrong field count, unknown field value,
/// bucketer parameters out of range) are not represented here: they panic,
/// since they indicate a static wiring bug rather than a recoverable
/// runtime outcome.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("metric name already registered: {0}")]
    NameInUse(String),

    #[error("registry is already initialized")]
    InitializationDone,

    #[error("field {field:?} value {value:?} contains the reserved ',' delimiter")]
    FieldValueContainsIllegalChar { field: String, value: String },

    #[error("unsupported bucketer kind: {0}")]
    UnsupportedBucketer(String),

    #[error("Initialize/Disable called more than once")]
    DoubleInitialize,

    #[error("event channel rejected metric message: {0}")]
    EmitFailed(String),
}
