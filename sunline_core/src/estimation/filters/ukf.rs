// sunline_core/src/estimation/filters/ukf.rs

use log::{debug, error, info, warn};
use nalgebra::{Cholesky, SMatrix, SVector, Vector3};
use serde::Deserialize;

use crate::config::SunlineFilterConfig;
use crate::error::FilterError;
use crate::estimation::filters::check_cycle_entry;
use crate::estimation::kalman::{check_covariance, innovation_padding, joseph_update, symmetrize};
use crate::estimation::switch::{switch_frame, switch_needed};
use crate::estimation::{CorrectionMode, CycleReport, FilterPhase, SunlineEstimator};
use crate::frames::ReferenceCandidates;
use crate::messages::{CssConfigMessage, FilterOutput, SensorSample};
use crate::models::dynamics::propagate;
use crate::models::measurement::build_observations;
use crate::types::{
    heading_of, KalmanGain, MeasurementVector, StateMatrix, StateVector, MAX_CSS_MEASUREMENTS,
    SUNLINE_STATES,
};

/// Number of sigma points, `2n + 1`.
pub const SIGMA_POINTS: usize = 2 * SUNLINE_STATES + 1;

type SigmaPoints = SMatrix<f64, SUNLINE_STATES, SIGMA_POINTS>;
type MeasurementSigmas = SMatrix<f64, MAX_CSS_MEASUREMENTS, SIGMA_POINTS>;
type SigmaWeights = SVector<f64, SIGMA_POINTS>;

/// Configuration parameters for the UKF's sigma point generation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UkfParams {
    pub alpha: f64, // Spreading of sigma points
    pub beta: f64,  // Prior knowledge of the distribution (2.0 is optimal for Gaussian)
    pub kappa: f64, // Secondary scaling parameter
}

impl Default for UkfParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 2.0,
            kappa: 0.0,
        }
    }
}

impl UkfParams {
    fn lambda(&self) -> f64 {
        let n = SUNLINE_STATES as f64;
        self.alpha.powi(2) * (n + self.kappa) - n
    }
}

/// Unscented sibling of [`SunlineSekf`](super::sekf::SunlineSekf).
///
/// Same cycle contract and frame switching, but the time update pushes sigma
/// points through the nonlinear propagation and the correction uses sample
/// statistics instead of the analytic Jacobians. There is no carried error:
/// every correction lands on the state directly.
pub struct SunlineUkf {
    config: SunlineFilterConfig,
    params: UkfParams,
    candidates: ReferenceCandidates,
    geometry: CssConfigMessage,
    phase: FilterPhase,

    state: StateVector,
    covariance: StateMatrix,
    reference: Vector3<f64>,
    time_tag: f64,

    // --- UKF-specific internal state ---
    weights_m: SigmaWeights,
    weights_c: SigmaWeights,

    state_error: StateVector,
    output: FilterOutput,
}

impl SunlineUkf {
    pub fn new(config: SunlineFilterConfig, params: UkfParams) -> Result<Self, FilterError> {
        config.validate()?;
        let n = SUNLINE_STATES as f64;
        let lambda = params.lambda();
        if !(lambda + n > 0.0) {
            return Err(FilterError::InvalidConfig(
                "ukf parameters must give a positive sigma point spread",
            ));
        }
        if Cholesky::new(config.initial_covariance_matrix()).is_none() {
            return Err(FilterError::InvalidConfig(
                "ukf initial covariance must be positive definite",
            ));
        }

        // Weights for the 2n+1 sigma points.
        let mut weights_m = SigmaWeights::from_element(0.5 / (n + lambda));
        let mut weights_c = weights_m;
        weights_m[0] = lambda / (n + lambda);
        weights_c[0] = weights_m[0] + (1.0 - params.alpha.powi(2) + params.beta);

        let candidates = config.candidates();
        let state = config.initial_state_vector();
        let covariance = config.initial_covariance_matrix();

        Ok(Self {
            config,
            params,
            candidates,
            geometry: CssConfigMessage::default(),
            phase: FilterPhase::Uninitialized,
            state,
            covariance,
            reference: candidates.primary,
            time_tag: 0.0,
            weights_m,
            weights_c,
            state_error: StateVector::zeros(),
            output: FilterOutput::default(),
        })
    }

    pub fn state(&self) -> &StateVector {
        &self.state
    }

    pub fn covariance(&self) -> &StateMatrix {
        &self.covariance
    }

    pub fn reference(&self) -> &Vector3<f64> {
        &self.reference
    }

    pub fn time_tag(&self) -> f64 {
        self.time_tag
    }

    /// Generates the `2n+1` sigma points around the current state.
    fn generate_sigma_points(&self) -> Result<SigmaPoints, FilterError> {
        // P = L * L^T
        let cholesky = Cholesky::new(self.covariance).ok_or(FilterError::SigmaPointFailure)?;
        let scale = (SUNLINE_STATES as f64 + self.params.lambda()).sqrt();
        let scaled_l = cholesky.l() * scale;

        let mut sigma_points = SigmaPoints::zeros();
        sigma_points.set_column(0, &self.state);
        for i in 0..SUNLINE_STATES {
            sigma_points.set_column(i + 1, &(self.state + scaled_l.column(i)));
            sigma_points.set_column(i + SUNLINE_STATES + 1, &(self.state - scaled_l.column(i)));
        }
        Ok(sigma_points)
    }

    /// Propagates the sigma points to `time` and recovers the predicted mean
    /// and covariance. Returns whether the identity basis was used.
    fn time_update(&mut self, time: f64) -> Result<bool, FilterError> {
        let dt = time - self.time_tag;
        if dt == 0.0 {
            return Ok(false);
        }

        let sigma_points = self.generate_sigma_points()?;
        let mut degenerate = false;
        let mut propagated = SigmaPoints::zeros();
        for i in 0..SIGMA_POINTS {
            let point: StateVector = sigma_points.column(i).into_owned();
            let prop = propagate(&point, dt, &self.reference, 0.0);
            degenerate |= prop.degenerate_basis;
            propagated.set_column(i, &prop.state);
        }

        let x_pred: StateVector = propagated * self.weights_m;
        let mut p_pred = StateMatrix::zeros();
        for i in 0..SIGMA_POINTS {
            let diff = propagated.column(i) - x_pred;
            p_pred += self.weights_c[i] * diff * diff.transpose();
        }
        // Process noise mapped through the mean.
        p_pred += propagate(&self.state, dt, &self.reference, self.config.process_noise)
            .process_noise;

        self.state = x_pred;
        self.covariance = symmetrize(&p_pred);
        self.time_tag = time;
        Ok(degenerate)
    }

    /// Sigma-point correction with the readings of `sample`.
    fn measurement_update(
        &mut self,
        sample: &SensorSample<'_>,
        report: &mut CycleReport,
    ) -> Result<MeasurementVector, FilterError> {
        let obs = build_observations(
            &self.state,
            sample.values,
            self.config.sensor_use_threshold,
            self.geometry.normals(),
        );
        report.num_obs = obs.count;
        if obs.is_empty() {
            debug!("sunline ukf cycle at {} s: no valid observations", sample.time);
            self.state_error = StateVector::zeros();
            return Ok(MeasurementVector::zeros());
        }
        report.mode = CorrectionMode::Unscented;

        // The cosine model is linear in the heading, so the Jacobian rows map
        // every sigma point to its predicted readings.
        let sigma_points = self.generate_sigma_points()?;
        let measurement_points: MeasurementSigmas = obs.jacobian * sigma_points;
        let z_pred: MeasurementVector = measurement_points * self.weights_m;

        let mut s_cov = innovation_padding::<MAX_CSS_MEASUREMENTS>(
            self.config.measurement_noise,
            obs.count,
        );
        let mut t_cov = KalmanGain::zeros();
        for i in 0..SIGMA_POINTS {
            let diff_z = measurement_points.column(i) - z_pred;
            let diff_x = sigma_points.column(i) - self.state;
            s_cov += self.weights_c[i] * diff_z * diff_z.transpose();
            t_cov += self.weights_c[i] * diff_x * diff_z.transpose();
        }

        let s_inv = s_cov
            .try_inverse()
            .ok_or(FilterError::SingularInnovation)?;
        let k_gain = t_cov * s_inv;

        let correction = k_gain * (obs.measured - z_pred);
        self.state += correction;
        // The cosine model is linear, so the Joseph form applies with the
        // exact H and keeps P positive semi-definite for tiny noise.
        self.covariance = joseph_update(
            &self.covariance,
            &k_gain,
            &obs.jacobian,
            self.config.measurement_noise,
            obs.count,
        );
        self.state_error = correction;

        debug!(
            "sunline ukf cycle at {} s: update with {} observations",
            sample.time, obs.count
        );
        Ok(obs.measured - obs.jacobian * self.state)
    }

    fn check_frame_switch(&mut self) -> bool {
        let heading = heading_of(&self.state);
        if !switch_needed(&heading, &self.reference, self.config.switch_threshold) {
            return false;
        }

        let switched = switch_frame(
            &self.reference,
            &self.candidates,
            &self.state,
            &StateVector::zeros(),
            &self.covariance,
        );
        self.reference = switched.reference;
        self.state = switched.state;
        self.covariance = switched.covariance;
        true
    }

    fn refresh_output(&mut self, residuals: &MeasurementVector, num_obs: usize) {
        self.output = FilterOutput::from_estimate(
            self.time_tag,
            &self.state,
            &self.state_error,
            &self.covariance,
            residuals,
            num_obs,
        );
    }
}

impl SunlineEstimator for SunlineUkf {
    fn reset(&mut self, time: f64, normals: &[Vector3<f64>]) -> Result<(), FilterError> {
        if normals.is_empty() {
            warn!("sunline ukf reset with no sensor geometry; no corrections will be made");
        }

        self.geometry = CssConfigMessage::from_normals(normals);
        self.state = self.config.initial_state_vector();
        self.covariance = self.config.initial_covariance_matrix();
        self.state_error = StateVector::zeros();
        self.reference = self.candidates.primary;
        self.time_tag = time;
        self.phase = FilterPhase::Ready;
        self.refresh_output(&MeasurementVector::zeros(), 0);

        info!(
            "sunline ukf reset at {} s with {} sensors",
            time, self.geometry.count
        );
        Ok(())
    }

    fn update(
        &mut self,
        call_time: f64,
        sample: Option<SensorSample<'_>>,
    ) -> Result<CycleReport, FilterError> {
        check_cycle_entry(self.phase, call_time, self.time_tag)?;

        let mut report = CycleReport {
            frame_switched: self.check_frame_switch(),
            ..Default::default()
        };
        let mut residuals = MeasurementVector::zeros();

        let cycle = match sample {
            Some(sample) if sample.time >= self.time_tag => {
                self.time_update(sample.time).and_then(|degenerate| {
                    report.degenerate_basis |= degenerate;
                    self.measurement_update(&sample, &mut report)
                })
            }
            Some(sample) => {
                debug!(
                    "ignoring stale sun sensor reading at {} s (filter at {} s)",
                    sample.time, self.time_tag
                );
                report.stale_reading = true;
                Ok(MeasurementVector::zeros())
            }
            None => Ok(MeasurementVector::zeros()),
        };

        let cycle = cycle.and_then(|post_fit| {
            residuals = post_fit;
            if call_time > self.time_tag {
                report.degenerate_basis |= self.time_update(call_time)?;
            }
            Ok(())
        });
        if let Err(e) = cycle {
            error!("sunline ukf cycle failed: {}", e);
            self.refresh_output(&MeasurementVector::zeros(), 0);
            return Err(e);
        }

        if report.mode == CorrectionMode::NoUpdate {
            self.state_error = StateVector::zeros();
        }
        if report.degenerate_basis {
            info!("sunline ukf propagation used the identity basis at {} s", self.time_tag);
        }
        if let Err(e) = check_covariance(&self.covariance) {
            error!("sunline ukf covariance check failed: {}", e);
            report.covariance_fault = Some(e);
        }

        let num_obs = if report.mode == CorrectionMode::NoUpdate {
            0
        } else {
            report.num_obs
        };
        self.refresh_output(&residuals, num_obs);
        Ok(report)
    }

    fn output(&self) -> &FilterOutput {
        &self.output
    }

    fn phase(&self) -> FilterPhase {
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::filters::sekf::SunlineSekf;
    use approx::assert_abs_diff_eq;

    fn config() -> SunlineFilterConfig {
        SunlineFilterConfig {
            initial_state: [0.7, 0.6, 0.2, 0.0, 0.0],
            initial_covariance: [
                [0.4, 0.0, 0.0, 0.0, 0.0],
                [0.0, 0.4, 0.0, 0.0, 0.0],
                [0.0, 0.0, 0.4, 0.0, 0.0],
                [0.0, 0.0, 0.0, 1e-4, 0.0],
                [0.0, 0.0, 0.0, 0.0, 1e-4],
            ],
            measurement_noise: 1e-3,
            ..Default::default()
        }
    }

    fn normals() -> [Vector3<f64>; 3] {
        [Vector3::x(), Vector3::y(), Vector3::new(0.0, 0.6, 0.8)]
    }

    #[test]
    fn test_weights_sum_to_one() {
        let ukf = SunlineUkf::new(config(), UkfParams::default()).unwrap();
        assert_abs_diff_eq!(ukf.weights_m.sum(), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_sigma_points_reproduce_covariance() {
        let mut ukf = SunlineUkf::new(config(), UkfParams::default()).unwrap();
        ukf.reset(0.0, &normals()).unwrap();

        let points = ukf.generate_sigma_points().unwrap();
        let mean: StateVector = points * ukf.weights_m;
        let mut cov = StateMatrix::zeros();
        for i in 0..SIGMA_POINTS {
            let diff = points.column(i) - mean;
            cov += ukf.weights_c[i] * diff * diff.transpose();
        }

        assert_abs_diff_eq!(mean, ukf.state, epsilon = 1e-12);
        assert_abs_diff_eq!(cov, ukf.covariance, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_singular_initial_covariance() {
        let mut bad = config();
        bad.initial_covariance[3][3] = 0.0;
        assert!(matches!(
            SunlineUkf::new(bad, UkfParams::default()),
            Err(FilterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_linear_correction_matches_sekf() {
        let mut ukf = SunlineUkf::new(config(), UkfParams::default()).unwrap();
        let mut sekf = SunlineSekf::new(config()).unwrap();
        ukf.reset(0.0, &normals()).unwrap();
        sekf.reset(0.0, &normals()).unwrap();

        let readings = [0.85, 0.5, 0.3];
        let sample = SensorSample {
            time: 0.0,
            values: &readings,
        };
        let a = ukf.update(0.0, Some(sample)).unwrap();
        let b = sekf.update(0.0, Some(sample)).unwrap();

        assert_eq!(a.mode, CorrectionMode::Unscented);
        assert_eq!(b.mode, CorrectionMode::Linearized);
        assert_abs_diff_eq!(ukf.output().state, sekf.output().state, epsilon = 1e-9);
        assert_abs_diff_eq!(
            ukf.output().covariance,
            sekf.output().covariance,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(
            ukf.output().post_fit_residuals,
            sekf.output().post_fit_residuals,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_stale_reading_is_flagged() {
        let mut ukf = SunlineUkf::new(config(), UkfParams::default()).unwrap();
        ukf.reset(5.0, &normals()).unwrap();
        let before = *ukf.state();

        let report = ukf
            .update(5.0, Some(SensorSample { time: 4.0, values: &[0.9, 0.1, 0.1] }))
            .unwrap();
        assert!(report.stale_reading);
        assert_eq!(report.mode, CorrectionMode::NoUpdate);
        assert_eq!(ukf.state(), &before);
    }

    #[test]
    fn test_covariance_stays_symmetric_psd() {
        let mut ukf = SunlineUkf::new(config(), UkfParams::default()).unwrap();
        ukf.reset(0.0, &normals()).unwrap();
        let readings = [0.95, 0.2, 0.1];

        for k in 1..=20 {
            let t = k as f64;
            let report = ukf
                .update(t, Some(SensorSample { time: t, values: &readings }))
                .unwrap();
            assert_eq!(report.covariance_fault, None);
            let p = ukf.covariance();
            assert_abs_diff_eq!(*p, p.transpose(), epsilon = 1e-12);
            assert!(p.symmetric_eigenvalues().iter().all(|v| *v > -1e-9));
        }
    }

    #[test]
    fn test_precise_sensors_keep_covariance_factorable() {
        let mut precise = config();
        precise.measurement_noise = 1e-12;
        precise.process_noise = 1e-12;
        precise.initial_covariance[3][3] = 1e-2;
        precise.initial_covariance[4][4] = 1e-2;
        let mut ukf = SunlineUkf::new(precise, UkfParams::default()).unwrap();
        ukf.reset(0.0, &normals()).unwrap();

        let sun = Vector3::new(0.7, 0.6, 0.3).normalize();
        let readings: Vec<f64> = normals().iter().map(|n| n.dot(&sun)).collect();

        let mut min_eig = f64::INFINITY;
        for k in 1..=200 {
            let t = k as f64;
            let report = ukf
                .update(t, Some(SensorSample { time: t, values: &readings }))
                .unwrap();
            assert_eq!(report.mode, CorrectionMode::Unscented);
            assert_eq!(report.covariance_fault, None);
            min_eig = min_eig.min(ukf.covariance().symmetric_eigenvalues().min());
        }

        assert!(min_eig > -1e-9, "min eigenvalue {}", min_eig);
        assert_abs_diff_eq!(ukf.output().heading, sun, epsilon = 1e-6);
    }
}
