// sunline_sim/src/sensors.rs

use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use sunline_core::messages::{CssArrayMessage, CssConfigMessage};

use crate::config::ScenarioConfig;
use crate::error::SimError;

/// An array of coarse sun sensors with additive Gaussian noise.
///
/// Each sensor reports the cosine between its boresight and the sun, clipped
/// at zero once the sun is behind it.
#[derive(Debug, Clone)]
pub struct CssArray {
    normals: Vec<Vector3<f64>>,
    noise: Normal<f64>,
}

impl CssArray {
    pub fn new(normals: Vec<Vector3<f64>>, noise_stddev: f64) -> Result<Self, SimError> {
        let noise = Normal::new(0.0, noise_stddev).map_err(|e| {
            SimError::InvalidScenario(format!("bad sensor noise {noise_stddev}: {e}"))
        })?;
        Ok(Self { normals, noise })
    }

    pub fn from_config(config: &ScenarioConfig) -> Result<Self, SimError> {
        Self::new(config.sensor_normals(), config.sensors.noise_stddev)
    }

    pub fn normals(&self) -> &[Vector3<f64>] {
        &self.normals
    }

    /// The geometry message published once at start-up.
    pub fn geometry_message(&self) -> CssConfigMessage {
        CssConfigMessage::from_normals(&self.normals)
    }

    /// One noisy sample of every sensor for the given body-frame heading.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        heading: &Vector3<f64>,
        eclipse: bool,
        rng: &mut R,
    ) -> CssArrayMessage {
        let mut msg = CssArrayMessage::default();
        if eclipse {
            return msg;
        }
        for (value, normal) in msg.cos_values.iter_mut().zip(&self.normals) {
            let ideal = normal.dot(heading).max(0.0);
            *value = (ideal + self.noise.sample(rng)).max(0.0);
        }
        msg
    }
}
