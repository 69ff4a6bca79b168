// sunline_sim/src/truth.rs

use nalgebra::{Rotation3, Vector3};

use crate::config::TruthConfig;

/// Sun direction seen from a spacecraft spinning at a constant body rate.
///
/// The sun is fixed in the inertial frame, so in the body frame it rotates
/// about the spin axis at the opposite rate.
#[derive(Debug, Clone)]
pub struct SpinningTruth {
    initial_heading: Vector3<f64>,
    body_rate: Vector3<f64>,
    eclipse: Option<(f64, f64)>,
}

impl SpinningTruth {
    pub fn new(initial_heading: Vector3<f64>, body_rate: Vector3<f64>) -> Self {
        Self {
            initial_heading: initial_heading.normalize(),
            body_rate,
            eclipse: None,
        }
    }

    pub fn from_config(config: &TruthConfig) -> Self {
        let mut truth = Self::new(
            Vector3::from(config.initial_sun_heading),
            Vector3::from(config.body_rate),
        );
        truth.eclipse = config.eclipse.map(|[start, end]| (start, end));
        truth
    }

    /// Unit sun heading in the body frame at `time` seconds.
    pub fn heading_at(&self, time: f64) -> Vector3<f64> {
        Rotation3::new(-self.body_rate * time) * self.initial_heading
    }

    pub fn body_rate(&self) -> &Vector3<f64> {
        &self.body_rate
    }

    /// True while the sun is occulted.
    pub fn in_eclipse(&self, time: f64) -> bool {
        self.eclipse
            .is_some_and(|(start, end)| time >= start && time < end)
    }
}
