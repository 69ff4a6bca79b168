// sunline_core/src/error.rs

use thiserror::Error;

/// Everything the estimation core can report back to its caller.
///
/// None of these abort the periodic task: the FSW adapter logs them and still
/// publishes the latest output.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FilterError {
    /// `update` was called before the first `reset`.
    #[error("filter has not been reset")]
    NotInitialized,

    /// The invocation clock ran backwards relative to the filter epoch.
    #[error("call time {call_time} s precedes filter time tag {time_tag} s")]
    ClockRegression { call_time: f64, time_tag: f64 },

    /// The gain solver was invoked without a single valid observation.
    #[error("kalman gain requested with zero observations")]
    NoObservations,

    /// `H·P·Hᵀ + R` could not be inverted.
    #[error("innovation covariance is singular")]
    SingularInnovation,

    /// The covariance is no longer symmetric positive semi-definite.
    #[error("covariance degraded at ({row}, {col}): {value}")]
    CovarianceDegraded { row: usize, col: usize, value: f64 },

    /// The covariance square root needed for sigma points does not exist.
    #[error("sigma point generation failed: covariance is not positive definite")]
    SigmaPointFailure,

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
