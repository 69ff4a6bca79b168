// sunline_core/src/estimation/mod.rs

use crate::error::FilterError;
use crate::messages::{FilterOutput, SensorSample};
use nalgebra::Vector3;

pub mod filters;
pub mod kalman;
pub mod switch;

/// Lifecycle of a filter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterPhase {
    /// Constructed but never reset; `update` is refused.
    #[default]
    Uninitialized,
    Ready,
}

/// Which correction branch a cycle used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrectionMode {
    /// No valid observation: the propagated prior was kept.
    #[default]
    NoUpdate,
    /// CKF: the correction is carried as a state error, the reference is untouched.
    Classical,
    /// EKF: the correction is folded into the reference state.
    Linearized,
    /// Sigma-point correction of the full state.
    Unscented,
}

/// What happened during one `update` call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CycleReport {
    pub mode: CorrectionMode,
    pub num_obs: usize,
    /// The reference vector was swapped at the start of the cycle.
    pub frame_switched: bool,
    /// Propagation fell back to the identity basis at least once.
    pub degenerate_basis: bool,
    /// A reading older than the filter epoch was ignored.
    pub stale_reading: bool,
    /// Result of the end-of-cycle covariance check.
    pub covariance_fault: Option<FilterError>,
}

/// The contract for any algorithm that estimates the sun heading.
///
/// Implementations own their state exclusively and are driven by one periodic
/// task; none of the methods block or allocate.
pub trait SunlineEstimator: Send {
    /// (Re)initializes the filter at `time` (seconds) from its configuration
    /// and the sensor geometry. Fully replaces any previous state.
    fn reset(&mut self, time: f64, normals: &[Vector3<f64>]) -> Result<(), FilterError>;

    /// Runs one cycle at `call_time` (seconds), optionally fusing a sample.
    fn update(
        &mut self,
        call_time: f64,
        sample: Option<SensorSample<'_>>,
    ) -> Result<CycleReport, FilterError>;

    /// The output refreshed by the last `reset` or `update`.
    fn output(&self) -> &FilterOutput;

    fn phase(&self) -> FilterPhase;
}
