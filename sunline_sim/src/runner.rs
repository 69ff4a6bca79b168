// sunline_sim/src/runner.rs

//! The closed loop: truth, sensors, bus topics and one estimator, stepped at
//! the filter period.

use std::path::Path;

use log::{debug, info, warn};
use nalgebra::Vector3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use sunline_core::estimation::filters::sekf::SunlineSekf;
use sunline_core::estimation::filters::ukf::SunlineUkf;
use sunline_core::estimation::{CorrectionMode, SunlineEstimator};
use sunline_core::fsw::{Publisher, SunlineFswModule};
use sunline_core::messages::{
    CssArrayMessage, CssConfigMessage, NavAttMessage, SunlineFilterMessage,
};

use crate::bus::Topic;
use crate::cli::EstimatorKind;
use crate::config::ScenarioConfig;
use crate::error::SimError;
use crate::sensors::CssArray;
use crate::truth::SpinningTruth;

const SEC2NANO: f64 = 1e9;

/// Aggregate results of one closed-loop run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub estimator: String,
    pub cycles: usize,
    /// Angle between the published and the true heading at the last cycle.
    pub final_heading_error_deg: f64,
    pub mean_heading_error_deg: f64,
    pub max_heading_error_deg: f64,
    /// Largest error over the second half of the run.
    pub settled_heading_error_deg: f64,
    pub frame_switches: usize,
    pub classical_updates: usize,
    pub linearized_updates: usize,
    pub unscented_updates: usize,
    pub no_update_cycles: usize,
    pub degenerate_cycles: usize,
    pub failed_cycles: usize,
    pub covariance_faults: usize,
    pub nav_messages: usize,
    pub filter_messages: usize,
}

/// Builds the requested estimator and runs the scenario with it.
pub fn run_scenario(config: &ScenarioConfig, kind: EstimatorKind) -> Result<RunSummary, SimError> {
    match kind {
        EstimatorKind::Sekf => {
            let filter = SunlineSekf::new(config.filter.clone())?;
            run_with(config, filter, "sekf")
        }
        EstimatorKind::Ukf => {
            let filter = SunlineUkf::new(config.filter.clone(), config.ukf)?;
            run_with(config, filter, "ukf")
        }
    }
}

/// Runs the scenario with any estimator.
pub fn run_with<E: SunlineEstimator>(
    config: &ScenarioConfig,
    estimator: E,
    label: &str,
) -> Result<RunSummary, SimError> {
    config.validate()?;

    let mut rng = match config.simulation.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let truth = SpinningTruth::from_config(&config.truth);
    let array = CssArray::from_config(config)?;

    let mut geometry = Topic::<CssConfigMessage>::new();
    let mut css = Topic::<CssArrayMessage>::new();
    let mut nav = Topic::<NavAttMessage>::new();
    let mut diag = Topic::<SunlineFilterMessage>::new();

    geometry.write(0, &array.geometry_message());
    let mut fsw = SunlineFswModule::new(estimator);
    fsw.reset(0, &geometry)?;

    let sim = &config.simulation;
    let steps = (sim.duration_seconds / sim.step_seconds).round() as usize;
    let mut next_sample = 0.0;
    let mut summary = RunSummary {
        estimator: label.to_string(),
        ..Default::default()
    };
    let mut error_sum = 0.0;

    info!(
        "Running {} for {:.1} s at {:.3} s steps with {} sensors",
        label,
        sim.duration_seconds,
        sim.step_seconds,
        array.normals().len()
    );

    for k in 1..=steps {
        let time = k as f64 * sim.step_seconds;
        let time_ns = (time * SEC2NANO).round() as u64;

        if time + 1e-9 >= next_sample {
            let sample = array.sample(&truth.heading_at(time), truth.in_eclipse(time), &mut rng);
            css.write(time_ns, &sample);
            next_sample += sim.sensor_period_seconds;
        }

        match fsw.update(time_ns, &css, &mut nav, &mut diag) {
            Ok(report) => {
                match report.mode {
                    CorrectionMode::NoUpdate => summary.no_update_cycles += 1,
                    CorrectionMode::Classical => summary.classical_updates += 1,
                    CorrectionMode::Linearized => summary.linearized_updates += 1,
                    CorrectionMode::Unscented => summary.unscented_updates += 1,
                }
                summary.frame_switches += usize::from(report.frame_switched);
                summary.degenerate_cycles += usize::from(report.degenerate_basis);
                if let Some(fault) = report.covariance_fault {
                    warn!("t = {:.3} s: {}", time, fault);
                    summary.covariance_faults += 1;
                }
            }
            Err(e) => {
                warn!("t = {:.3} s: filter cycle failed: {}", time, e);
                summary.failed_cycles += 1;
            }
        }

        let published = fsw.estimator().output().heading;
        let error = heading_error_deg(&published, &truth.heading_at(time));
        debug!("t = {:.3} s: heading error {:.4} deg", time, error);

        summary.cycles += 1;
        error_sum += error;
        summary.max_heading_error_deg = summary.max_heading_error_deg.max(error);
        if 2 * k > steps {
            summary.settled_heading_error_deg = summary.settled_heading_error_deg.max(error);
        }
        summary.final_heading_error_deg = error;
    }

    if summary.cycles > 0 {
        summary.mean_heading_error_deg = error_sum / summary.cycles as f64;
    }
    summary.nav_messages = nav.write_count();
    summary.filter_messages = diag.write_count();

    info!(
        "{}: final error {:.3} deg, settled {:.3} deg, {} frame switches, {} failed cycles",
        label,
        summary.final_heading_error_deg,
        summary.settled_heading_error_deg,
        summary.frame_switches,
        summary.failed_cycles
    );
    Ok(summary)
}

/// Angle between two headings in degrees. A zero vector counts as 180.
pub fn heading_error_deg(estimate: &Vector3<f64>, truth: &Vector3<f64>) -> f64 {
    match (estimate.try_normalize(1e-12), truth.try_normalize(1e-12)) {
        (Some(a), Some(b)) => a.dot(&b).clamp(-1.0, 1.0).acos().to_degrees(),
        _ => 180.0,
    }
}

/// Writes the summary as TOML.
pub fn write_report(summary: &RunSummary, path: &Path) -> Result<(), SimError> {
    let text = toml::to_string_pretty(summary)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, text)?;
    info!("Wrote run report to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_error() {
        assert!(heading_error_deg(&Vector3::x(), &Vector3::x()).abs() < 1e-6);
        assert!((heading_error_deg(&Vector3::x(), &Vector3::y()) - 90.0).abs() < 1e-9);
        assert!((heading_error_deg(&(2.0 * Vector3::x()), &-Vector3::x()) - 180.0).abs() < 1e-9);
        assert_eq!(heading_error_deg(&Vector3::zeros(), &Vector3::x()), 180.0);
    }

    #[test]
    fn test_summary_serializes_to_toml() {
        let summary = RunSummary {
            estimator: "sekf".into(),
            cycles: 3,
            ..Default::default()
        };
        let text = toml::to_string_pretty(&summary).unwrap();
        assert!(text.contains("estimator = \"sekf\""));
        assert!(text.contains("cycles = 3"));
    }

    #[test]
    fn test_every_cycle_publishes() {
        let mut config = ScenarioConfig::default();
        config.simulation.seed = Some(3);
        config.simulation.duration_seconds = 5.0;
        config.simulation.step_seconds = 0.5;
        let summary = run_scenario(&config, EstimatorKind::Sekf).unwrap();
        assert_eq!(summary.cycles, 10);
        assert_eq!(summary.nav_messages, 10);
        assert_eq!(summary.filter_messages, 10);
        assert_eq!(summary.failed_cycles, 0);
    }
}
