// sunline_core/src/fsw.rs

//! Flight-software module wrapper: reads the bus, runs an estimator, writes
//! the navigation and diagnostics messages every cycle.

use log::warn;
use nalgebra::Vector3;

use crate::error::FilterError;
use crate::estimation::{CycleReport, SunlineEstimator};
use crate::messages::{
    CssArrayMessage, CssConfigMessage, NavAttMessage, SensorSample, SunlineFilterMessage,
};
use crate::types::NANO2SEC;

/// A message read from the bus together with its write metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stamped<T> {
    /// Bus time of the last write, nanoseconds.
    pub time_written_ns: u64,
    /// Size of the last write; zero if the topic was never written.
    pub size: usize,
    pub payload: T,
}

impl<T> Stamped<T> {
    pub fn is_written(&self) -> bool {
        self.size > 0
    }
}

/// Read side of a bus topic.
pub trait Subscriber<T> {
    /// Latest message. A never-written topic reads with `size == 0` and a
    /// default payload.
    fn read(&self) -> Stamped<T>;
}

/// Write side of a bus topic.
pub trait Publisher<T> {
    fn write(&mut self, call_time_ns: u64, payload: &T);
}

/// Drives a [`SunlineEstimator`] from bus messages.
pub struct SunlineFswModule<E> {
    estimator: E,
}

impl<E: SunlineEstimator> SunlineFswModule<E> {
    pub fn new(estimator: E) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut E {
        &mut self.estimator
    }

    /// Reads the sensor geometry once and resets the estimator.
    pub fn reset<G>(&mut self, call_time_ns: u64, geometry: &G) -> Result<(), FilterError>
    where
        G: Subscriber<CssConfigMessage>,
    {
        let config = geometry.read();
        let normals: &[Vector3<f64>] = if config.is_written() {
            config.payload.normals()
        } else {
            warn!("sun sensor configuration was never written; using zero sensors");
            &[]
        };

        self.estimator
            .reset(call_time_ns as f64 * NANO2SEC, normals)
    }

    /// Runs one cycle. Both output messages are written even when the
    /// estimator reports an error.
    pub fn update<S, N, F>(
        &mut self,
        call_time_ns: u64,
        css: &S,
        nav: &mut N,
        filter: &mut F,
    ) -> Result<CycleReport, FilterError>
    where
        S: Subscriber<CssArrayMessage>,
        N: Publisher<NavAttMessage>,
        F: Publisher<SunlineFilterMessage>,
    {
        let readings = css.read();
        let sample = readings.is_written().then(|| SensorSample {
            time: readings.time_written_ns as f64 * NANO2SEC,
            values: &readings.payload.cos_values,
        });

        let result = self
            .estimator
            .update(call_time_ns as f64 * NANO2SEC, sample);

        let output = self.estimator.output();
        nav.write(call_time_ns, &output.nav_message());
        filter.write(call_time_ns, &output.filter_message());

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SunlineFilterConfig;
    use crate::estimation::filters::sekf::SunlineSekf;
    use crate::estimation::CorrectionMode;

    struct Topic<T> {
        last: Option<(u64, T)>,
        writes: usize,
    }

    impl<T> Topic<T> {
        fn empty() -> Self {
            Self {
                last: None,
                writes: 0,
            }
        }
    }

    impl<T: Copy + Default> Subscriber<T> for Topic<T> {
        fn read(&self) -> Stamped<T> {
            match self.last {
                Some((time_written_ns, payload)) => Stamped {
                    time_written_ns,
                    size: core::mem::size_of::<T>(),
                    payload,
                },
                None => Stamped {
                    time_written_ns: 0,
                    size: 0,
                    payload: T::default(),
                },
            }
        }
    }

    impl<T: Copy> Publisher<T> for Topic<T> {
        fn write(&mut self, call_time_ns: u64, payload: &T) {
            self.last = Some((call_time_ns, *payload));
            self.writes += 1;
        }
    }

    fn module() -> SunlineFswModule<SunlineSekf> {
        let config = SunlineFilterConfig {
            initial_state: [0.6, 0.7, 0.2, 0.0, 0.0],
            ..Default::default()
        };
        SunlineFswModule::new(SunlineSekf::new(config).unwrap())
    }

    #[test]
    fn test_unwritten_inputs_still_publish() {
        let mut fsw = module();
        let geometry = Topic::<CssConfigMessage>::empty();
        fsw.reset(0, &geometry).unwrap();

        let css = Topic::<CssArrayMessage>::empty();
        let mut nav = Topic::<NavAttMessage>::empty();
        let mut diag = Topic::<SunlineFilterMessage>::empty();
        let report = fsw.update(1_000_000_000, &css, &mut nav, &mut diag).unwrap();

        assert_eq!(report.mode, CorrectionMode::NoUpdate);
        assert_eq!(nav.writes, 1);
        assert_eq!(diag.writes, 1);
        let (_, msg) = nav.last.unwrap();
        assert!((msg.time_tag - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_update_before_reset_publishes_and_reports() {
        let mut fsw = module();
        let css = Topic::<CssArrayMessage>::empty();
        let mut nav = Topic::<NavAttMessage>::empty();
        let mut diag = Topic::<SunlineFilterMessage>::empty();

        let result = fsw.update(0, &css, &mut nav, &mut diag);
        assert_eq!(result, Err(FilterError::NotInitialized));
        assert_eq!(nav.writes, 1);
        assert_eq!(diag.writes, 1);
    }

    #[test]
    fn test_readings_are_fused_with_nanosecond_clock() {
        let mut fsw = module();
        let mut geometry = Topic::<CssConfigMessage>::empty();
        geometry.write(
            0,
            &CssConfigMessage::from_normals(&[Vector3::x(), Vector3::y(), Vector3::z()]),
        );
        fsw.reset(0, &geometry).unwrap();

        let mut css = Topic::<CssArrayMessage>::empty();
        let mut reading = CssArrayMessage::default();
        reading.cos_values[..3].copy_from_slice(&[0.6, 0.7, 0.2]);
        css.write(500_000_000, &reading);

        let mut nav = Topic::<NavAttMessage>::empty();
        let mut diag = Topic::<SunlineFilterMessage>::empty();
        let report = fsw
            .update(1_000_000_000, &css, &mut nav, &mut diag)
            .unwrap();

        assert_eq!(report.num_obs, 3);
        assert_eq!(report.mode, CorrectionMode::Linearized);
        let (_, msg) = diag.last.unwrap();
        assert_eq!(msg.num_obs, 3);
        // Caught up to the call time after fusing the reading at 0.5 s.
        assert!((msg.time_tag - 1.0).abs() < 1e-12);
        assert!((fsw.estimator().time_tag() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_estimator_is_reachable_between_cycles() {
        let config = SunlineFilterConfig {
            initial_state: [0.6, 0.7, 0.2, 0.0, 0.0],
            // Large covariance keeps the first correction classical.
            divergence_threshold: 0.5,
            ..Default::default()
        };
        let mut fsw = SunlineFswModule::new(SunlineSekf::new(config).unwrap());
        let mut geometry = Topic::<CssConfigMessage>::empty();
        geometry.write(
            0,
            &CssConfigMessage::from_normals(&[Vector3::x(), Vector3::y(), Vector3::z()]),
        );
        fsw.reset(0, &geometry).unwrap();

        let mut css = Topic::<CssArrayMessage>::empty();
        let mut reading = CssArrayMessage::default();
        reading.cos_values[..3].copy_from_slice(&[0.5, 0.8, 0.3]);
        css.write(1_000_000_000, &reading);
        let mut nav = Topic::<NavAttMessage>::empty();
        let mut diag = Topic::<SunlineFilterMessage>::empty();
        let report = fsw
            .update(1_000_000_000, &css, &mut nav, &mut diag)
            .unwrap();
        assert_eq!(report.mode, CorrectionMode::Classical);

        let best = fsw.estimator().best_estimate();
        assert!(fsw.estimator().carried_error().amax() > 0.0);
        fsw.estimator_mut().synchronize();
        assert_eq!(*fsw.estimator().carried_error(), crate::types::StateVector::zeros());
        assert_eq!(*fsw.estimator().state(), best);
    }
}
