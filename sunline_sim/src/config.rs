// sunline_sim/src/config.rs

//! Scenario files: loading, defaults and validation.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Format, Toml},
    Figment,
};
use log::{info, warn};
use nalgebra::Vector3;
use serde::Deserialize;
use sunline_core::config::SunlineFilterConfig;
use sunline_core::estimation::filters::ukf::UkfParams;
use sunline_core::types::MAX_CSS_SENSORS;
use walkdir::WalkDir;

use crate::error::SimError;

// =========================================================================
// == Top-Level Configuration ==
// =========================================================================

/// The root of the data parsed from a `scenario.toml` file.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)] // Fail if the TOML has fields not in our struct
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: Simulation,
    #[serde(default)]
    pub truth: TruthConfig,
    #[serde(default)]
    pub sensors: SensorArrayConfig,
    #[serde(default)]
    pub filter: SunlineFilterConfig,
    #[serde(default)]
    pub ukf: UkfParams,
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Simulation {
    /// Optional seed for the pseudo-random number generator for determinism.
    pub seed: Option<u64>,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
    /// Period of the filter task in seconds.
    pub step_seconds: f64,
    /// Period of the sensor array in seconds.
    pub sensor_period_seconds: f64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            seed: None,
            duration_seconds: 120.0,
            step_seconds: 0.5,
            sensor_period_seconds: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TruthConfig {
    /// Sun direction in the body frame at t = 0. Normalized on use.
    pub initial_sun_heading: [f64; 3],
    /// Constant body angular rate relative to inertial, rad/s.
    #[serde(default)]
    pub body_rate: [f64; 3],
    /// Start and end of a window, in seconds, in which the sun is occulted.
    #[serde(default)]
    pub eclipse: Option<[f64; 2]>,
}

impl Default for TruthConfig {
    fn default() -> Self {
        Self {
            initial_sun_heading: [0.6, 0.7, 0.39],
            body_rate: [0.0, 0.0, 0.0],
            eclipse: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorArrayConfig {
    /// Body-frame boresight of each sensor. Normalized on use.
    #[serde(default = "default_normals")]
    pub normals: Vec<[f64; 3]>,
    /// Standard deviation of the additive noise on each cosine.
    #[serde(default = "default_noise_stddev")]
    pub noise_stddev: f64,
}

impl Default for SensorArrayConfig {
    fn default() -> Self {
        Self {
            normals: default_normals(),
            noise_stddev: default_noise_stddev(),
        }
    }
}

/// Eight sensors on two rings tilted 45 degrees above and below the x-y plane.
fn default_normals() -> Vec<[f64; 3]> {
    let tilt = core::f64::consts::FRAC_PI_4;
    (0..8)
        .map(|k| {
            let upper = k < 4;
            let azimuth = (k % 4) as f64 * core::f64::consts::FRAC_PI_2
                + if upper { 0.0 } else { core::f64::consts::FRAC_PI_4 };
            let elevation = if upper { tilt } else { -tilt };
            [
                elevation.cos() * azimuth.cos(),
                elevation.cos() * azimuth.sin(),
                elevation.sin(),
            ]
        })
        .collect()
}

fn default_noise_stddev() -> f64 {
    0.001
}

// =========================================================================
// == Loading & Validation ==
// =========================================================================

impl ScenarioConfig {
    /// Parses a scenario from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, SimError> {
        let config: ScenarioConfig = Figment::new().merge(Toml::string(text)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Body-frame sensor normals as unit vectors.
    pub fn sensor_normals(&self) -> Vec<Vector3<f64>> {
        self.sensors
            .normals
            .iter()
            .map(|n| Vector3::from(*n).normalize())
            .collect()
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let sim = &self.simulation;
        for (name, value) in [
            ("duration_seconds", sim.duration_seconds),
            ("step_seconds", sim.step_seconds),
            ("sensor_period_seconds", sim.sensor_period_seconds),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::InvalidScenario(format!(
                    "simulation.{name} must be positive, got {value}"
                )));
            }
        }

        if Vector3::from(self.truth.initial_sun_heading).norm() < 1e-9 {
            return Err(SimError::InvalidScenario(
                "truth.initial_sun_heading must be non-zero".into(),
            ));
        }
        if let Some([start, end]) = self.truth.eclipse {
            if end <= start {
                return Err(SimError::InvalidScenario(format!(
                    "truth.eclipse must end after it starts, got [{start}, {end}]"
                )));
            }
        }

        if self.sensors.normals.len() > MAX_CSS_SENSORS {
            return Err(SimError::InvalidScenario(format!(
                "at most {} sensors are supported, got {}",
                MAX_CSS_SENSORS,
                self.sensors.normals.len()
            )));
        }
        if self
            .sensors
            .normals
            .iter()
            .any(|n| Vector3::from(*n).norm() < 1e-9)
        {
            return Err(SimError::InvalidScenario(
                "sensor normals must be non-zero".into(),
            ));
        }
        if !(self.sensors.noise_stddev.is_finite() && self.sensors.noise_stddev >= 0.0) {
            return Err(SimError::InvalidScenario(
                "sensors.noise_stddev must be non-negative".into(),
            ));
        }

        self.filter.validate()?;
        Ok(())
    }
}

/// Loads and validates a scenario file.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, SimError> {
    info!("Loading scenario from: {}", path.display());
    let config: ScenarioConfig = Figment::new().merge(Toml::file(path)).extract()?;
    config.validate()?;
    Ok(config)
}

/// All `.toml` files below `dir`, sorted by path.
pub fn list_scenarios(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Scenario directory not found at {:?}", dir);
        return Vec::new();
    }

    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| {
            !e.file_type().is_dir() && e.path().extension().is_some_and(|ext| ext == "toml")
        })
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}
