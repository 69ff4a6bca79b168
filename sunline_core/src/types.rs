// sunline_core/src/types.rs

use nalgebra::{SMatrix, SVector, Vector3};

// --- Filter Dimensions ---
/// Number of states in the switching sunline filter: heading (3) + tangential rates (2).
pub const SUNLINE_STATES: usize = 5;
/// Number of heading components at the top of the state vector.
pub const HEADING_STATES: usize = 3;
/// Number of tangential rate components at the bottom of the state vector.
pub const RATE_STATES: usize = SUNLINE_STATES - HEADING_STATES;

/// Capacity of the coarse sun sensor arrays carried on the message bus.
pub const MAX_CSS_SENSORS: usize = 32;
/// Upper bound on the observations used in a single correction.
pub const MAX_CSS_MEASUREMENTS: usize = 8;

/// Bus clocks run in nanoseconds, the filter in seconds.
pub const NANO2SEC: f64 = 1.0e-9;

// --- Core Type Aliases ---
pub type StateVector = SVector<f64, SUNLINE_STATES>;
pub type StateMatrix = SMatrix<f64, SUNLINE_STATES, SUNLINE_STATES>;
/// Maps the two rate-noise channels into the full state (`Γ`).
pub type NoiseMapping = SMatrix<f64, SUNLINE_STATES, RATE_STATES>;
pub type MeasurementVector = SVector<f64, MAX_CSS_MEASUREMENTS>;
/// Observation Jacobian `H`; rows past the observation count are zero.
pub type MeasurementMatrix = SMatrix<f64, MAX_CSS_MEASUREMENTS, SUNLINE_STATES>;
pub type KalmanGain = SMatrix<f64, SUNLINE_STATES, MAX_CSS_MEASUREMENTS>;

/// Returns the (unnormalized) heading part of a sunline state vector.
pub fn heading_of(state: &StateVector) -> Vector3<f64> {
    state.fixed_rows::<HEADING_STATES>(0).into_owned()
}
