// sunline_core/src/models/dynamics.rs

use nalgebra::{Matrix2, Vector3};

use crate::frames::FrameBasis;
use crate::types::{
    heading_of, NoiseMapping, StateMatrix, StateVector, HEADING_STATES, RATE_STATES,
};

/// Result of one propagation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Propagation {
    /// The propagated reference state.
    pub state: StateVector,
    /// First-order state transition matrix, `I + dt·A`.
    pub stm: StateMatrix,
    /// Dynamics Jacobian `A` evaluated at the input state.
    pub dynamics: StateMatrix,
    /// Process noise added to the covariance over the step, `Γ·Q·Γᵀ`.
    pub process_noise: StateMatrix,
    /// The local frame could not be built and the identity fallback was used.
    pub degenerate_basis: bool,
}

/// Body-frame angular rate of the body relative to the sun frame.
///
/// States 3 and 4 hold the tangential rate of S relative to B, so the rate
/// vector in S is `[0, -s3, -s4]` before rotating it into the body frame.
pub fn body_rate(state: &StateVector, basis: &FrameBasis) -> Vector3<f64> {
    basis.to_body(&Vector3::new(0.0, -state[3], -state[4]))
}

/// Analytic Jacobian of the heading kinematics `ḋ = -ω × d`.
///
/// The heading/heading block is `-[ω]×`, the heading/rate block is the last two
/// columns of `-[d]× · C_BS`. Rate rows are zero (constant-rate model).
pub fn dynamics_matrix(state: &StateVector, basis: &FrameBasis) -> StateMatrix {
    let heading = heading_of(state);
    let omega = body_rate(state, basis);
    let heading_rate = -heading.cross_matrix() * basis.dcm_bs;

    let mut a = StateMatrix::zeros();
    a.fixed_view_mut::<HEADING_STATES, HEADING_STATES>(0, 0)
        .copy_from(&(-omega.cross_matrix()));
    a.fixed_view_mut::<HEADING_STATES, RATE_STATES>(0, HEADING_STATES)
        .copy_from(&heading_rate.fixed_columns::<RATE_STATES>(1));
    a
}

/// Noise mapping `Γ`: rate noise integrates once into the rates and twice
/// into the heading.
pub fn noise_mapping(state: &StateVector, basis: &FrameBasis, dt: f64) -> NoiseMapping {
    let heading = heading_of(state);
    let heading_block = heading.cross_matrix() * basis.dcm_bs * (dt * dt / 2.0);

    let mut gamma = NoiseMapping::zeros();
    gamma
        .fixed_view_mut::<HEADING_STATES, RATE_STATES>(0, 0)
        .copy_from(&heading_block.fixed_columns::<RATE_STATES>(1));
    gamma
        .fixed_view_mut::<RATE_STATES, RATE_STATES>(HEADING_STATES, 0)
        .copy_from(&(Matrix2::identity() * dt));
    gamma
}

/// Advances the reference state by `dt` seconds.
///
/// The heading takes a first-order rotation step, the rates are held
/// constant. `A` and the STM use the input state, `Γ` the propagated one.
/// `dt == 0` returns the input state with `STM = I` and no added process
/// noise; `dynamics` still holds `A` at the input state.
pub fn propagate(
    state: &StateVector,
    dt: f64,
    reference: &Vector3<f64>,
    process_noise: f64,
) -> Propagation {
    debug_assert!(dt >= 0.0, "propagate: dt cannot be negative");

    let heading = heading_of(state);
    let basis = FrameBasis::new(&heading, reference);
    let dynamics = dynamics_matrix(state, &basis);

    let mut new_state = *state;
    if dt > 0.0 {
        let omega = body_rate(state, &basis);
        let delta = omega.cross(&heading) * -dt;
        new_state
            .fixed_rows_mut::<HEADING_STATES>(0)
            .copy_from(&(heading + delta));
    }

    let stm = StateMatrix::identity() + dynamics * dt;

    // Γ is evaluated at the propagated heading.
    let new_basis = FrameBasis::new(&heading_of(&new_state), reference);
    let gamma = noise_mapping(&new_state, &new_basis, dt);
    let q = Matrix2::identity() * process_noise;

    Propagation {
        state: new_state,
        stm,
        dynamics,
        process_noise: gamma * q * gamma.transpose(),
        degenerate_basis: basis.degenerate || new_basis.degenerate,
    }
}
