//! Error types for the metric registry.

use thiserror::Error;

/// Result type alias for registry operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors raised when declaring or writing metrics.
#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("metric already declared: {0}")]
    Duplicate(String),

    #[error("invalid metric or label name: {0:?}")]
    InvalidName(String),

    #[error("unknown metric id {0}")]
    UnknownMetric(usize),

    #[error("metric {name} is a {actual}, not a {expected}")]
    KindMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("metric {name} expects {expected} label values, got {actual}")]
    LabelArity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("metric {name} has no state {state:?}")]
    UnknownState { name: String, state: String },
}
