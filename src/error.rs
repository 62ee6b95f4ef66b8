//! Error types shared by the histogrammer and the percentile inverter

use thiserror::Error;

/// Errors raised while building histograms or inverting them into percentiles.
///
/// Every failure aborts the current computation. Undefined values are never
/// silently propagated into results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Malformed dimensions, non-increasing bin edges or invalid options
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A timestep holds no volume inside the binned tracer range
    #[error("degenerate distribution: total volume is zero at time index {time_index}")]
    DegenerateDistribution { time_index: usize },

    /// Too few strictly increasing points remain to interpolate
    #[error(
        "insufficient data: {found} monotonic point(s) at time index {time_index}, need at least 2"
    )]
    InsufficientData { time_index: usize, found: usize },
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Attach the timestep an error occurred at
    pub(crate) fn at_time(self, time_index: usize) -> Self {
        match self {
            Error::DegenerateDistribution { .. } => Error::DegenerateDistribution { time_index },
            Error::InsufficientData { found, .. } => Error::InsufficientData { time_index, found },
            other => other,
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = core::result::Result<T, Error>;
