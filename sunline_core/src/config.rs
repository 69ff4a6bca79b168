// sunline_core/src/config.rs

use nalgebra::Vector3;
use serde::Deserialize;

use crate::error::FilterError;
use crate::frames::ReferenceCandidates;
use crate::types::{StateMatrix, StateVector, SUNLINE_STATES};

/// Tuning and initialization for one sunline filter instance.
///
/// Set at construction and applied at every `reset`; never changed mid-run.
/// The state dimension and the observation bound are compile-time constants
/// (`SUNLINE_STATES`, `MAX_CSS_MEASUREMENTS`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SunlineFilterConfig {
    /// Initial state: heading (3) followed by the two tangential rates.
    #[serde(default = "default_initial_state")]
    pub initial_state: [f64; SUNLINE_STATES],
    /// Initial covariance, row-major.
    #[serde(default = "default_initial_covariance")]
    pub initial_covariance: [[f64; SUNLINE_STATES]; SUNLINE_STATES],
    /// Cosine above which the reference vector is swapped.
    #[serde(default = "default_switch_threshold")]
    pub switch_threshold: f64,
    /// Max absolute covariance entry above which the classical update is used.
    #[serde(default = "default_divergence_threshold")]
    pub divergence_threshold: f64,
    /// Variance of a single cosine observation.
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: f64,
    /// Spectral density driving the two rate states.
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
    /// Minimum cosine for a sensor reading to be trusted.
    #[serde(default)]
    pub sensor_use_threshold: f64,
    /// The two body axes the reference vector alternates between.
    #[serde(default = "default_reference_candidates")]
    pub reference_candidates: [[f64; 3]; 2],
}

fn default_initial_state() -> [f64; SUNLINE_STATES] {
    [1.0, 0.0, 0.0, 0.0, 0.0]
}

fn default_initial_covariance() -> [[f64; SUNLINE_STATES]; SUNLINE_STATES] {
    let mut p = [[0.0; SUNLINE_STATES]; SUNLINE_STATES];
    for (i, row) in p.iter_mut().enumerate() {
        row[i] = if i < 3 { 1.0 } else { 0.02 };
    }
    p
}

fn default_switch_threshold() -> f64 {
    0.866
}

fn default_divergence_threshold() -> f64 {
    5.0
}

fn default_measurement_noise() -> f64 {
    0.017 * 0.017
}

fn default_process_noise() -> f64 {
    0.001 * 0.001
}

fn default_reference_candidates() -> [[f64; 3]; 2] {
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
}

impl Default for SunlineFilterConfig {
    fn default() -> Self {
        Self {
            initial_state: default_initial_state(),
            initial_covariance: default_initial_covariance(),
            switch_threshold: default_switch_threshold(),
            divergence_threshold: default_divergence_threshold(),
            measurement_noise: default_measurement_noise(),
            process_noise: default_process_noise(),
            sensor_use_threshold: 0.0,
            reference_candidates: default_reference_candidates(),
        }
    }
}

impl SunlineFilterConfig {
    pub fn initial_state_vector(&self) -> StateVector {
        StateVector::from_row_slice(&self.initial_state)
    }

    pub fn initial_covariance_matrix(&self) -> StateMatrix {
        StateMatrix::from_fn(|i, j| self.initial_covariance[i][j])
    }

    pub fn candidates(&self) -> ReferenceCandidates {
        let [primary, secondary] = self.reference_candidates;
        ReferenceCandidates {
            primary: Vector3::from(primary),
            secondary: Vector3::from(secondary),
        }
    }

    /// Checks every value the filter relies on for numerical sanity.
    pub fn validate(&self) -> Result<(), FilterError> {
        if !self.initial_state.iter().all(|v| v.is_finite()) {
            return Err(FilterError::InvalidConfig("initial state must be finite"));
        }
        if self.initial_state[..3].iter().all(|v| *v == 0.0) {
            return Err(FilterError::InvalidConfig("initial heading must be non-zero"));
        }

        let p = self.initial_covariance_matrix();
        if !p.iter().all(|v| v.is_finite()) {
            return Err(FilterError::InvalidConfig("initial covariance must be finite"));
        }
        if (p - p.transpose()).amax() > 1e-12 {
            return Err(FilterError::InvalidConfig("initial covariance must be symmetric"));
        }
        if p.diagonal().iter().any(|v| *v < 0.0) {
            return Err(FilterError::InvalidConfig(
                "initial covariance diagonal must be non-negative",
            ));
        }

        // Above 1/sqrt(2) a switch always lands below the threshold for two
        // orthogonal candidates.
        if !(self.switch_threshold > core::f64::consts::FRAC_1_SQRT_2
            && self.switch_threshold < 1.0)
        {
            return Err(FilterError::InvalidConfig(
                "switch threshold must lie in (1/sqrt(2), 1)",
            ));
        }
        if !(self.divergence_threshold.is_finite() && self.divergence_threshold > 0.0) {
            return Err(FilterError::InvalidConfig(
                "divergence threshold must be positive",
            ));
        }
        if !(self.measurement_noise.is_finite() && self.measurement_noise > 0.0) {
            return Err(FilterError::InvalidConfig(
                "measurement noise must be positive",
            ));
        }
        if !(self.process_noise.is_finite() && self.process_noise >= 0.0) {
            return Err(FilterError::InvalidConfig(
                "process noise must be non-negative",
            ));
        }
        if !self.sensor_use_threshold.is_finite() {
            return Err(FilterError::InvalidConfig("sensor use threshold must be finite"));
        }

        let candidates = self.candidates();
        for axis in [candidates.primary, candidates.secondary] {
            if (axis.norm() - 1.0).abs() > 1e-9 {
                return Err(FilterError::InvalidConfig(
                    "reference candidates must be unit vectors",
                ));
            }
        }
        if candidates.primary.dot(&candidates.secondary).abs() > 1e-9 {
            return Err(FilterError::InvalidConfig(
                "reference candidates must be orthogonal",
            ));
        }

        Ok(())
    }
}
