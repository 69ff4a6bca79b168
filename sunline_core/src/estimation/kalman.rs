// sunline_core/src/estimation/kalman.rs

//! Gain computation and covariance update shared by the sunline filters.
//!
//! The gain and Joseph helpers are generic over the state dimension `N` and
//! the observation bound `M`. Only the first `count` observation rows are
//! meaningful; the unused rows of `H` must be zero.

use nalgebra::SMatrix;

use crate::error::FilterError;
use crate::estimation::CorrectionMode;
use crate::models::measurement::ObservationSet;
use crate::types::{MeasurementVector, StateMatrix, StateVector};

/// Asymmetry or negative-diagonal tolerance of the covariance health check.
pub const COVARIANCE_TOLERANCE: f64 = 1e-9;

/// `R = r·I` on the first `count` diagonal entries, zero elsewhere.
pub fn measurement_noise<const M: usize>(r: f64, count: usize) -> SMatrix<f64, M, M> {
    SMatrix::from_fn(|i, j| if i == j && i < count { r } else { 0.0 })
}

/// Noise added to a fixed-size innovation covariance: `r` on the used
/// diagonal, ones on the unused one so the inverse exists. With zero rows in
/// `H` past `count` the matching gain columns come out zero.
pub fn innovation_padding<const M: usize>(r: f64, count: usize) -> SMatrix<f64, M, M> {
    SMatrix::from_fn(|i, j| match (i == j, i < count) {
        (true, true) => r,
        (true, false) => 1.0,
        _ => 0.0,
    })
}

/// Kalman gain `K = P̄·Hᵀ·(H·P̄·Hᵀ + R)⁻¹`.
pub fn kalman_gain<const N: usize, const M: usize>(
    p_bar: &SMatrix<f64, N, N>,
    h: &SMatrix<f64, M, N>,
    r: f64,
    count: usize,
) -> Result<SMatrix<f64, N, M>, FilterError> {
    if count == 0 {
        return Err(FilterError::NoObservations);
    }

    let s = h * p_bar * h.transpose() + innovation_padding::<M>(r, count);
    let s_inv = s.try_inverse().ok_or(FilterError::SingularInnovation)?;

    Ok(p_bar * h.transpose() * s_inv)
}

/// Joseph-form covariance update, `(I-KH)·P̄·(I-KH)ᵀ + K·R·Kᵀ`, symmetrized.
pub fn joseph_update<const N: usize, const M: usize>(
    p_bar: &SMatrix<f64, N, N>,
    k: &SMatrix<f64, N, M>,
    h: &SMatrix<f64, M, N>,
    r: f64,
    count: usize,
) -> SMatrix<f64, N, N> {
    let i_kh = SMatrix::<f64, N, N>::identity() - k * h;
    let r_mat = measurement_noise::<M>(r, count);
    symmetrize(&(i_kh * p_bar * i_kh.transpose() + k * r_mat * k.transpose()))
}

/// Averages a matrix with its transpose.
pub fn symmetrize<const N: usize>(p: &SMatrix<f64, N, N>) -> SMatrix<f64, N, N> {
    (p + p.transpose()) * 0.5
}

/// Picks the correction branch from the propagated covariance.
///
/// A strictly larger max absolute entry than `divergence_threshold` selects
/// the classical branch.
pub fn select_mode<const N: usize>(
    p_bar: &SMatrix<f64, N, N>,
    divergence_threshold: f64,
    count: usize,
) -> CorrectionMode {
    if count == 0 {
        CorrectionMode::NoUpdate
    } else if p_bar.amax() > divergence_threshold {
        CorrectionMode::Classical
    } else {
        CorrectionMode::Linearized
    }
}

/// Reports the first non-finite, asymmetric or negative-variance entry.
pub fn check_covariance<const N: usize>(p: &SMatrix<f64, N, N>) -> Result<(), FilterError> {
    for i in 0..N {
        let diag = p[(i, i)];
        if !diag.is_finite() || diag < -COVARIANCE_TOLERANCE {
            return Err(FilterError::CovarianceDegraded {
                row: i,
                col: i,
                value: diag,
            });
        }
        for j in (i + 1)..N {
            let value = p[(i, j)];
            let scale = value.abs().max(p[(j, i)].abs()).max(1.0);
            if !value.is_finite() || (value - p[(j, i)]).abs() > COVARIANCE_TOLERANCE * scale {
                return Err(FilterError::CovarianceDegraded {
                    row: i,
                    col: j,
                    value,
                });
            }
        }
    }
    Ok(())
}

/// Result of one measurement correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub mode: CorrectionMode,
    /// Reference state after the correction.
    pub state: StateVector,
    /// The total state error estimated this cycle, `x̄ + K·(y - H·x̄)`.
    pub state_error: StateVector,
    /// The error still carried relative to `state` (zero after a linearized update).
    pub carried_error: StateVector,
    pub covariance: StateMatrix,
    pub post_fit_residuals: MeasurementVector,
}

/// Applies one correction to the propagated reference `state`, carried error
/// `x_bar` and covariance `p_bar`.
///
/// `mode` must be one of the two update branches; `NoUpdate` returns the prior.
pub fn correct(
    mode: CorrectionMode,
    state: &StateVector,
    x_bar: &StateVector,
    p_bar: &StateMatrix,
    obs: &ObservationSet,
    r: f64,
) -> Result<Correction, FilterError> {
    if mode == CorrectionMode::NoUpdate {
        return Ok(Correction {
            mode,
            state: *state,
            state_error: *x_bar,
            carried_error: *x_bar,
            covariance: *p_bar,
            post_fit_residuals: MeasurementVector::zeros(),
        });
    }

    let h = &obs.jacobian;
    let k = kalman_gain(p_bar, h, r, obs.count)?;

    let y = obs.innovation();
    let x = x_bar + k * (y - h * x_bar);
    let covariance = joseph_update(p_bar, &k, h, r, obs.count);
    let post_fit_residuals = y - h * x;

    let (state, carried_error) = match mode {
        CorrectionMode::Linearized => (state + x, StateVector::zeros()),
        _ => (*state, x),
    };

    Ok(Correction {
        mode,
        state,
        state_error: x,
        carried_error,
        covariance,
        post_fit_residuals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::measurement::build_observations;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Matrix2, Matrix2x3, Matrix3, Vector3};

    fn normals() -> [Vector3<f64>; 3] {
        [Vector3::x(), Vector3::y(), Vector3::new(0.0, 0.6, 0.8)]
    }

    fn prior() -> StateMatrix {
        StateMatrix::from_diagonal(&StateVector::from_row_slice(&[0.3, 0.2, 0.25, 0.01, 0.01]))
    }

    fn assert_psd(p: &StateMatrix) {
        assert_abs_diff_eq!(*p, p.transpose(), epsilon = 1e-12);
        let eig = p.symmetric_eigenvalues();
        assert!(eig.iter().all(|v| *v > -1e-9), "eigenvalues {eig}");
    }

    #[test]
    fn test_gain_matches_textbook_form_on_used_block() {
        let p: Matrix3<f64> = Matrix3::new(2.0, 0.3, 0.0, 0.3, 1.0, 0.1, 0.0, 0.1, 0.5);
        let mut h = Matrix2x3::zeros();
        h[(0, 0)] = 1.0;
        let k = kalman_gain::<3, 2>(&p, &h, 0.5, 1).unwrap();

        // One observation of state 0: K = P[:,0] / (P00 + r).
        assert_abs_diff_eq!(k.column(0).into_owned(), p.column(0) / 2.5, epsilon = 1e-12);
        assert_eq!(k.column(1).into_owned(), Vector3::zeros());
    }

    #[test]
    fn test_gain_refuses_zero_observations() {
        let k = kalman_gain::<3, 2>(&Matrix3::identity(), &Matrix2x3::zeros(), 0.1, 0);
        assert_eq!(k, Err(FilterError::NoObservations));
    }

    #[test]
    fn test_joseph_equals_simple_form_for_optimal_gain() {
        let p = Matrix2::new(1.0, 0.2, 0.2, 0.5);
        let h = Matrix2::identity();
        let k = kalman_gain::<2, 2>(&p, &h, 0.1, 2).unwrap();
        let joseph = joseph_update(&p, &k, &h, 0.1, 2);
        let simple = (Matrix2::identity() - k * h) * p;
        assert_abs_diff_eq!(joseph, simple, epsilon = 1e-12);
    }

    #[test]
    fn test_measurement_noise_only_covers_used_rows() {
        let r = measurement_noise::<4>(0.2, 2);
        assert_eq!(r[(1, 1)], 0.2);
        assert_eq!(r[(2, 2)], 0.0);
        assert_eq!(r[(0, 1)], 0.0);

        let padded = innovation_padding::<4>(0.2, 2);
        assert_eq!(padded[(1, 1)], 0.2);
        assert_eq!(padded[(3, 3)], 1.0);
        assert_eq!(padded[(3, 2)], 0.0);
    }

    #[test]
    fn test_mode_boundary_is_strict() {
        let threshold = 2.0;
        let eps = 1e-9;
        let mut p = prior();

        p[(0, 0)] = threshold - eps;
        assert_eq!(select_mode(&p, threshold, 2), CorrectionMode::Linearized);
        p[(0, 0)] = threshold;
        assert_eq!(select_mode(&p, threshold, 2), CorrectionMode::Linearized);
        p[(0, 0)] = threshold + eps;
        assert_eq!(select_mode(&p, threshold, 2), CorrectionMode::Classical);
        // Off-diagonal magnitudes count too.
        let mut q = prior();
        q[(0, 1)] = -(threshold + eps);
        q[(1, 0)] = -(threshold + eps);
        assert_eq!(select_mode(&q, threshold, 2), CorrectionMode::Classical);

        assert_eq!(select_mode(&p, threshold, 0), CorrectionMode::NoUpdate);
    }

    #[test]
    fn test_both_branches_give_the_same_best_estimate() {
        let state = StateVector::from_row_slice(&[0.7, 0.7, 0.1, 0.0, 0.0]);
        let readings = [0.95, 0.2, 0.15];
        let obs = build_observations(&state, &readings, 0.0, &normals());
        let x_bar = StateVector::zeros();
        let p_bar = prior();

        let ekf = correct(CorrectionMode::Linearized, &state, &x_bar, &p_bar, &obs, 1e-3).unwrap();
        let ckf = correct(CorrectionMode::Classical, &state, &x_bar, &p_bar, &obs, 1e-3).unwrap();

        assert_eq!(ckf.state, state);
        assert_eq!(ekf.carried_error, StateVector::zeros());
        assert_abs_diff_eq!(ekf.state, ckf.state + ckf.carried_error, epsilon = 1e-14);
        assert_abs_diff_eq!(ekf.covariance, ckf.covariance, epsilon = 1e-14);
        assert_psd(&ekf.covariance);
        assert_psd(&ckf.covariance);
        assert!(ekf.covariance.trace() < p_bar.trace());
    }

    #[test]
    fn test_linearized_update_folds_carried_error() {
        let state = StateVector::from_row_slice(&[0.9, 0.1, 0.0, 0.0, 0.0]);
        let x_bar = StateVector::from_row_slice(&[0.05, -0.05, 0.0, 0.0, 0.0]);
        let readings = [1.0, 0.0];

        let obs = build_observations(&state, &readings, 0.0, &normals());
        let carried = correct(CorrectionMode::Linearized, &state, &x_bar, &prior(), &obs, 1e-2).unwrap();

        // Same as synchronizing first and correcting with no carried error.
        let synced = state + x_bar;
        let obs = build_observations(&synced, &readings, 0.0, &normals());
        let folded = correct(
            CorrectionMode::Linearized,
            &synced,
            &StateVector::zeros(),
            &prior(),
            &obs,
            1e-2,
        )
        .unwrap();

        assert_abs_diff_eq!(carried.state, folded.state, epsilon = 1e-14);
        assert_abs_diff_eq!(carried.state, state + carried.state_error, epsilon = 1e-15);
    }

    #[test]
    fn test_post_fit_residuals_shrink() {
        let state = StateVector::from_row_slice(&[0.6, 0.6, 0.0, 0.0, 0.0]);
        let obs = build_observations(&state, &[1.0, 0.0], 0.0, &normals());
        let out = correct(
            CorrectionMode::Linearized,
            &state,
            &StateVector::zeros(),
            &prior(),
            &obs,
            1e-4,
        )
        .unwrap();

        assert!(out.post_fit_residuals.norm() < obs.innovation().norm());
        assert_eq!(out.post_fit_residuals[2], 0.0);
    }

    #[test]
    fn test_no_update_returns_prior() {
        let state = StateVector::x();
        let x_bar = StateVector::from_row_slice(&[0.0, 0.1, 0.0, 0.0, 0.0]);
        let out = correct(
            CorrectionMode::NoUpdate,
            &state,
            &x_bar,
            &prior(),
            &ObservationSet::default(),
            1e-4,
        )
        .unwrap();
        assert_eq!(out.state, state);
        assert_eq!(out.carried_error, x_bar);
        assert_eq!(out.covariance, prior());
    }

    #[test]
    fn test_check_covariance_flags_faults() {
        assert_eq!(check_covariance(&prior()), Ok(()));

        let mut p = prior();
        p[(2, 2)] = -0.1;
        assert!(matches!(
            check_covariance(&p),
            Err(FilterError::CovarianceDegraded { row: 2, col: 2, .. })
        ));

        let mut q = Matrix2::<f64>::identity();
        q[(0, 1)] = 0.5;
        assert!(matches!(
            check_covariance(&q),
            Err(FilterError::CovarianceDegraded { row: 0, col: 1, .. })
        ));
    }
}
