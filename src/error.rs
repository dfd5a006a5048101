use thiserror::Error;

use crate::imitator::sink::SinkError;

/// Errors surfaced by imitator operations.
#[derive(Debug, Error)]
pub enum ImitatorError {
    /// An indexed target does not exist.
    #[error("{what} index {index} out of range (0..{len})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// Pushing telemetry to the monitored device failed.
    #[error("telemetry push failed: {0}")]
    Sink(#[from] SinkError),
}
