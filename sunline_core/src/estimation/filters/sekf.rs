// sunline_core/src/estimation/filters/sekf.rs

use log::{debug, error, info, warn};
use nalgebra::Vector3;

use crate::config::SunlineFilterConfig;
use crate::error::FilterError;
use crate::estimation::filters::check_cycle_entry;
use crate::estimation::kalman::{check_covariance, correct, select_mode};
use crate::estimation::switch::{switch_frame, switch_needed};
use crate::estimation::{CorrectionMode, CycleReport, FilterPhase, SunlineEstimator};
use crate::frames::ReferenceCandidates;
use crate::messages::{CssConfigMessage, FilterOutput, SensorSample};
use crate::models::dynamics::propagate;
use crate::models::measurement::build_observations;
use crate::types::{heading_of, MeasurementVector, StateMatrix, StateVector};

/// Switching sunline filter: an EKF that falls back to classical (CKF)
/// corrections while the covariance is large, estimating the sun heading and
/// the two rates of the local sun frame.
///
/// The reference state is propagated nonlinearly; corrections made in the
/// classical branch are carried as a state error `x` on top of it until the
/// next linearized update, frame switch or explicit `synchronize`.
pub struct SunlineSekf {
    config: SunlineFilterConfig,
    candidates: ReferenceCandidates,
    geometry: CssConfigMessage,
    phase: FilterPhase,

    /// Reference state.
    state: StateVector,
    /// Carried state error relative to `state`.
    x: StateVector,
    covariance: StateMatrix,
    /// Propagated state error and covariance of the last time update.
    x_bar: StateVector,
    covar_bar: StateMatrix,
    /// Secondary body vector the local frame is built on.
    reference: Vector3<f64>,
    time_tag: f64,

    state_error: StateVector,
    output: FilterOutput,
}

impl SunlineSekf {
    /// Creates an un-reset filter from a validated configuration.
    pub fn new(config: SunlineFilterConfig) -> Result<Self, FilterError> {
        config.validate()?;
        let candidates = config.candidates();
        let state = config.initial_state_vector();
        let covariance = config.initial_covariance_matrix();

        Ok(Self {
            config,
            candidates,
            geometry: CssConfigMessage::default(),
            phase: FilterPhase::Uninitialized,
            state,
            x: StateVector::zeros(),
            covariance,
            x_bar: StateVector::zeros(),
            covar_bar: covariance,
            reference: candidates.primary,
            time_tag: 0.0,
            state_error: StateVector::zeros(),
            output: FilterOutput::default(),
        })
    }

    pub fn config(&self) -> &SunlineFilterConfig {
        &self.config
    }

    /// The reference state, excluding any carried error.
    pub fn state(&self) -> &StateVector {
        &self.state
    }

    /// The carried (not yet folded) state error.
    pub fn carried_error(&self) -> &StateVector {
        &self.x
    }

    /// Reference state plus carried error.
    pub fn best_estimate(&self) -> StateVector {
        self.state + self.x
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

    /// Folds the carried state error into the reference state.
    pub fn synchronize(&mut self) {
        self.state += self.x;
        self.x = StateVector::zeros();
    }

    /// Propagates the reference state, the carried error and the covariance
    /// to `time` into `x_bar`/`covar_bar`. Returns whether the identity basis
    /// was used.
    fn time_update(&mut self, time: f64) -> bool {
        let dt = time - self.time_tag;
        let prop = propagate(&self.state, dt, &self.reference, self.config.process_noise);

        self.state = prop.state;
        self.x_bar = prop.stm * self.x;
        self.covar_bar = prop.stm * self.covariance * prop.stm.transpose() + prop.process_noise;
        self.time_tag = time;

        prop.degenerate_basis
    }

    fn commit_prior(&mut self) {
        self.x = self.x_bar;
        self.covariance = self.covar_bar;
    }

    fn refresh_output(&mut self, residuals: &MeasurementVector, num_obs: usize) {
        self.output = FilterOutput::from_estimate(
            self.time_tag,
            &self.best_estimate(),
            &self.state_error,
            &self.covariance,
            residuals,
            num_obs,
        );
    }

    /// Swaps the reference vector if the best heading has drifted toward it.
    fn check_frame_switch(&mut self) -> bool {
        let heading = heading_of(&self.best_estimate());
        if !switch_needed(&heading, &self.reference, self.config.switch_threshold) {
            return false;
        }

        self.synchronize();
        let switched = switch_frame(
            &self.reference,
            &self.candidates,
            &self.state,
            &self.x,
            &self.covariance,
        );
        self.reference = switched.reference;
        self.state = switched.state;
        self.x = switched.carried_error;
        self.covariance = switched.covariance;
        true
    }

    /// Time update to the reading, then correction. Returns the post-fit
    /// residuals; the mode and observation count go into `report`.
    fn measurement_cycle(
        &mut self,
        sample: &SensorSample<'_>,
        report: &mut CycleReport,
    ) -> Result<MeasurementVector, FilterError> {
        report.degenerate_basis |= self.time_update(sample.time);

        let obs = build_observations(
            &self.state,
            sample.values,
            self.config.sensor_use_threshold,
            self.geometry.normals(),
        );
        let mode = select_mode(&self.covar_bar, self.config.divergence_threshold, obs.count);
        report.num_obs = obs.count;
        report.mode = mode;

        if mode == CorrectionMode::NoUpdate {
            debug!("sunline cycle at {} s: no valid observations", sample.time);
            self.commit_prior();
            return Ok(MeasurementVector::zeros());
        }

        let c = correct(
            mode,
            &self.state,
            &self.x_bar,
            &self.covar_bar,
            &obs,
            self.config.measurement_noise,
        )?;
        debug!(
            "sunline cycle at {} s: {:?} update with {} observations",
            sample.time, mode, obs.count
        );

        self.state = c.state;
        self.x = c.carried_error;
        self.covariance = c.covariance;
        self.state_error = c.state_error;
        Ok(c.post_fit_residuals)
    }
}

impl SunlineEstimator for SunlineSekf {
    fn reset(&mut self, time: f64, normals: &[Vector3<f64>]) -> Result<(), FilterError> {
        if normals.is_empty() {
            warn!("sunline reset with no sensor geometry; no corrections will be made");
        }

        self.geometry = CssConfigMessage::from_normals(normals);
        self.state = self.config.initial_state_vector();
        self.covariance = self.config.initial_covariance_matrix();
        self.x = StateVector::zeros();
        self.x_bar = StateVector::zeros();
        self.covar_bar = self.covariance;
        self.state_error = StateVector::zeros();
        self.reference = self.candidates.primary;
        self.time_tag = time;
        self.phase = FilterPhase::Ready;
        self.refresh_output(&MeasurementVector::zeros(), 0);

        info!(
            "sunline filter reset at {} s with {} sensors",
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

        match sample {
            Some(sample) if sample.time >= self.time_tag => {
                match self.measurement_cycle(&sample, &mut report) {
                    Ok(post_fit) => residuals = post_fit,
                    Err(e) => {
                        error!("sunline correction failed: {}", e);
                        self.commit_prior();
                        self.refresh_output(&residuals, 0);
                        return Err(e);
                    }
                }
            }
            Some(sample) => {
                debug!(
                    "ignoring stale sun sensor reading at {} s (filter at {} s)",
                    sample.time, self.time_tag
                );
                report.stale_reading = true;
            }
            None => {}
        }

        if report.mode == CorrectionMode::NoUpdate {
            self.state_error = self.x;
        }

        if call_time > self.time_tag {
            report.degenerate_basis |= self.time_update(call_time);
            self.commit_prior();
        }

        if report.degenerate_basis {
            info!("sunline propagation used the identity basis at {} s", self.time_tag);
        }
        if let Err(e) = check_covariance(&self.covariance) {
            error!("sunline covariance check failed: {}", e);
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
