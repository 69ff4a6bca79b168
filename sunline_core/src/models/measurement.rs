// sunline_core/src/models/measurement.rs

use nalgebra::Vector3;

use crate::types::{
    heading_of, MeasurementMatrix, MeasurementVector, StateVector, HEADING_STATES,
    MAX_CSS_MEASUREMENTS,
};

/// The observations gathered for one correction.
///
/// Only the first `count` entries are populated; the remainder of every array
/// is zero so the fixed-size matrices can be used directly by the gain solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationSet {
    /// Raw cosine values that passed the validity test.
    pub measured: MeasurementVector,
    /// Cosines predicted from the heading the set was built against.
    pub predicted: MeasurementVector,
    /// One row per observation: the sensor normal, padded with zeros for the rates.
    pub jacobian: MeasurementMatrix,
    pub count: usize,
}

impl Default for ObservationSet {
    fn default() -> Self {
        Self {
            measured: MeasurementVector::zeros(),
            predicted: MeasurementVector::zeros(),
            jacobian: MeasurementMatrix::zeros(),
            count: 0,
        }
    }
}

impl ObservationSet {
    /// `measured - predicted`, zero past `count`.
    pub fn innovation(&self) -> MeasurementVector {
        self.measured - self.predicted
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Predicted cosine of a sensor: the unnormalized heading projected on its normal.
///
/// The model is exactly linear in the heading states, so `normal` is also the
/// Jacobian row.
pub fn predict_cosine(heading: &Vector3<f64>, normal: &Vector3<f64>) -> f64 {
    normal.dot(heading)
}

/// Scans the readings in sensor order and keeps those at or above `threshold`.
///
/// At most `MAX_CSS_MEASUREMENTS` observations are kept; extra valid readings
/// are dropped. Readings without a matching normal are ignored.
pub fn build_observations(
    state: &StateVector,
    readings: &[f64],
    threshold: f64,
    normals: &[Vector3<f64>],
) -> ObservationSet {
    let heading = heading_of(state);
    let mut obs = ObservationSet::default();

    for (reading, normal) in readings.iter().zip(normals) {
        if obs.count == MAX_CSS_MEASUREMENTS {
            break;
        }
        if *reading < threshold {
            continue;
        }

        let row = obs.count;
        obs.measured[row] = *reading;
        obs.predicted[row] = predict_cosine(&heading, normal);
        obs.jacobian
            .fixed_view_mut::<1, HEADING_STATES>(row, 0)
            .copy_from(&normal.transpose());
        obs.count += 1;
    }

    obs
}
