// sunline_core/src/messages.rs

use nalgebra::{Vector2, Vector3};

use crate::types::{
    MeasurementVector, StateMatrix, StateVector, HEADING_STATES, MAX_CSS_MEASUREMENTS,
    MAX_CSS_SENSORS, RATE_STATES,
};

// =========================================================================
// == Input Messages (read from the bus) ==
// =========================================================================

/// Raw coarse sun sensor readings, one cosine value per sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CssArrayMessage {
    pub cos_values: [f64; MAX_CSS_SENSORS],
}

impl Default for CssArrayMessage {
    fn default() -> Self {
        Self {
            cos_values: [0.0; MAX_CSS_SENSORS],
        }
    }
}

/// Geometry of the sensor array: the body-frame unit normal of each sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CssConfigMessage {
    pub count: usize,
    pub unit_normals: [Vector3<f64>; MAX_CSS_SENSORS],
}

impl Default for CssConfigMessage {
    fn default() -> Self {
        Self {
            count: 0,
            unit_normals: [Vector3::zeros(); MAX_CSS_SENSORS],
        }
    }
}

impl CssConfigMessage {
    /// Builds a configuration from a list of normals, truncated to `MAX_CSS_SENSORS`.
    pub fn from_normals(normals: &[Vector3<f64>]) -> Self {
        let mut msg = Self::default();
        for (slot, normal) in msg.unit_normals.iter_mut().zip(normals) {
            *slot = *normal;
        }
        msg.count = normals.len().min(MAX_CSS_SENSORS);
        msg
    }

    /// The populated normals.
    pub fn normals(&self) -> &[Vector3<f64>] {
        &self.unit_normals[..self.count.min(MAX_CSS_SENSORS)]
    }
}

/// One time-tagged set of readings handed to an estimator.
#[derive(Debug, Clone, Copy)]
pub struct SensorSample<'a> {
    /// Time the readings were written, seconds.
    pub time: f64,
    pub values: &'a [f64],
}

// =========================================================================
// == Output Messages (written to the bus) ==
// =========================================================================

/// Navigation estimate consumed by the control law.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NavAttMessage {
    pub time_tag: f64,
    /// Unit sun heading in the body frame.
    pub sun_heading: Vector3<f64>,
}

/// Filter diagnostics for telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunlineFilterMessage {
    pub time_tag: f64,
    pub num_obs: usize,
    pub covariance: StateMatrix,
    /// State in the physical rate convention.
    pub state: StateVector,
    pub state_error: StateVector,
    pub post_fit_residuals: [f64; MAX_CSS_SENSORS],
}

impl Default for SunlineFilterMessage {
    fn default() -> Self {
        Self {
            time_tag: 0.0,
            num_obs: 0,
            covariance: StateMatrix::zeros(),
            state: StateVector::zeros(),
            state_error: StateVector::zeros(),
            post_fit_residuals: [0.0; MAX_CSS_SENSORS],
        }
    }
}

/// The per-cycle product of an estimator. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOutput {
    pub time_tag: f64,
    /// Normalized heading of the best estimate.
    pub heading: Vector3<f64>,
    /// Angular velocity of the body relative to the sun frame, physical convention.
    pub rates: Vector2<f64>,
    /// Full best-estimate state with the rates in the physical convention.
    pub state: StateVector,
    pub state_error: StateVector,
    pub covariance: StateMatrix,
    pub post_fit_residuals: MeasurementVector,
    pub num_obs: usize,
}

impl Default for FilterOutput {
    fn default() -> Self {
        Self {
            time_tag: 0.0,
            heading: Vector3::zeros(),
            rates: Vector2::zeros(),
            state: StateVector::zeros(),
            state_error: StateVector::zeros(),
            covariance: StateMatrix::zeros(),
            post_fit_residuals: MeasurementVector::zeros(),
            num_obs: 0,
        }
    }
}

impl FilterOutput {
    /// Assembles the output from a best-estimate state in the internal
    /// convention (rates of S relative to B).
    pub fn from_estimate(
        time_tag: f64,
        estimate: &StateVector,
        state_error: &StateVector,
        covariance: &StateMatrix,
        post_fit_residuals: &MeasurementVector,
        num_obs: usize,
    ) -> Self {
        let mut state = *estimate;
        for rate in state.iter_mut().skip(HEADING_STATES) {
            *rate = -*rate;
        }

        let heading = state.fixed_rows::<HEADING_STATES>(0).into_owned();
        let heading = heading.try_normalize(f64::EPSILON).unwrap_or(heading);

        Self {
            time_tag,
            heading,
            rates: state.fixed_rows::<RATE_STATES>(HEADING_STATES).into_owned(),
            state,
            state_error: *state_error,
            covariance: *covariance,
            post_fit_residuals: *post_fit_residuals,
            num_obs: num_obs.min(MAX_CSS_MEASUREMENTS),
        }
    }

    pub fn nav_message(&self) -> NavAttMessage {
        NavAttMessage {
            time_tag: self.time_tag,
            sun_heading: self.heading,
        }
    }

    pub fn filter_message(&self) -> SunlineFilterMessage {
        let mut post_fit_residuals = [0.0; MAX_CSS_SENSORS];
        for (slot, value) in post_fit_residuals
            .iter_mut()
            .zip(self.post_fit_residuals.iter())
        {
            *slot = *value;
        }

        SunlineFilterMessage {
            time_tag: self.time_tag,
            num_obs: self.num_obs,
            covariance: self.covariance,
            state: self.state,
            state_error: self.state_error,
            post_fit_residuals,
        }
    }
}
